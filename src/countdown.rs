//! Per-task countdown state and the timers that drive it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

pub const EXPIRED_TEXT: &str = "Deadline Expired!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// Splits a non-negative number of milliseconds into whole units.
    pub fn from_millis(remaining: i64) -> Countdown {
        Countdown {
            days: remaining / MS_PER_DAY,
            hours: (remaining / MS_PER_HOUR) % 24,
            minutes: (remaining / MS_PER_MINUTE) % 60,
            seconds: (remaining / MS_PER_SECOND) % 60,
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Countdown: {}d {}h {}m {}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickerState {
    Running,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Remaining(Countdown),
    /// The deadline passed on this tick. Reported exactly once.
    Expired,
    /// Already expired; nothing to do.
    Stopped,
}

#[derive(Clone, Debug)]
pub struct Ticker {
    deadline: DateTime<Utc>,
    state: TickerState,
}

impl Ticker {
    pub fn new(deadline: DateTime<Utc>) -> Ticker {
        Ticker {
            deadline,
            state: TickerState::Running,
        }
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.state == TickerState::Expired {
            return Tick::Stopped;
        }

        let remaining = (self.deadline - now).num_milliseconds();
        if remaining < 0 {
            self.state = TickerState::Expired;
            Tick::Expired
        } else {
            Tick::Remaining(Countdown::from_millis(remaining))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickEvent {
    pub id: u64,
    pub at: DateTime<Utc>,
}

/// Owns one repeating timer per displayed task.
///
/// Timers post [`TickEvent`]s to the UI loop and stop when cancelled, when
/// the receiving side goes away, or when the registry is dropped.
pub struct TickerRegistry {
    period: Duration,
    tx: UnboundedSender<TickEvent>,
    handles: HashMap<u64, JoinHandle<()>>,
}

impl TickerRegistry {
    pub fn new(period: Duration, tx: UnboundedSender<TickEvent>) -> TickerRegistry {
        TickerRegistry {
            period,
            tx,
            handles: HashMap::new(),
        }
    }

    /// Starts ticking for `id`, replacing any timer it already had.
    pub fn start(&mut self, id: u64) {
        let tx = self.tx.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; skip it so the cadence
            // matches a plain repeating timer.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(TickEvent { id, at: Utc::now() }).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.handles.insert(id, handle) {
            previous.abort();
        }
        debug!("Started countdown timer for task {}", id);
    }

    pub fn cancel(&mut self, id: u64) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                handle.abort();
                debug!("Cancelled countdown timer for task {}", id);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn active(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for TickerRegistry {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tokio::sync::mpsc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_decomposes_one_of_each_unit() {
        let countdown = Countdown::from_millis(90_061_000);
        assert_eq!(
            countdown,
            Countdown {
                days: 1,
                hours: 1,
                minutes: 1,
                seconds: 1
            }
        );
        assert_eq!(countdown.to_string(), "Countdown: 1d 1h 1m 1s");
    }

    #[test]
    fn test_decomposition_truncates_partial_units() {
        let countdown = Countdown::from_millis(3 * MS_PER_DAY + 23 * MS_PER_HOUR + 59_999);
        assert_eq!(countdown.days, 3);
        assert_eq!(countdown.hours, 23);
        assert_eq!(countdown.minutes, 0);
        assert_eq!(countdown.seconds, 59);
    }

    #[test]
    fn test_ticker_reports_remaining_time() {
        let mut ticker = Ticker::new(now() + ChronoDuration::milliseconds(90_061_000));
        assert_eq!(
            ticker.tick(now()),
            Tick::Remaining(Countdown::from_millis(90_061_000))
        );
        assert_eq!(ticker.state(), TickerState::Running);
    }

    #[test]
    fn test_ticker_at_exact_deadline_still_running() {
        let mut ticker = Ticker::new(now());
        assert_eq!(ticker.tick(now()), Tick::Remaining(Countdown::from_millis(0)));
        assert_eq!(ticker.state(), TickerState::Running);
    }

    #[test]
    fn test_past_deadline_expires_on_first_tick_and_stays_expired() {
        let mut ticker = Ticker::new(now() - ChronoDuration::seconds(5));

        assert_eq!(ticker.tick(now()), Tick::Expired);
        assert_eq!(ticker.state(), TickerState::Expired);

        // Even a clock jumping backwards does not revive it.
        assert_eq!(ticker.tick(now() - ChronoDuration::days(1)), Tick::Stopped);
        assert_eq!(ticker.state(), TickerState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_ticks_every_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = TickerRegistry::new(Duration::from_secs(1), tx);
        registry.start(4);

        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let mut ids = Vec::new();
        while let Ok(event) = rx.try_recv() {
            ids.push(event.id);
        }
        assert_eq!(ids, vec![4, 4, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_stops_ticking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = TickerRegistry::new(Duration::from_secs(1), tx);
        registry.start(1);
        registry.start(2);
        assert_eq!(registry.active(), 2);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(registry.cancel(1));
        assert!(!registry.cancel(1));
        assert!(!registry.is_running(1));
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(2_000)).await;

        let mut ids = Vec::new();
        while let Ok(event) = rx.try_recv() {
            ids.push(event.id);
        }
        assert_eq!(ids, vec![2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_existing_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = TickerRegistry::new(Duration::from_secs(1), tx);
        registry.start(9);
        registry.start(9);
        assert_eq!(registry.active(), 1);

        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_registry_stops_all_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = TickerRegistry::new(Duration::from_secs(1), tx);
        registry.start(1);
        drop(registry);

        tokio::time::sleep(Duration::from_secs(3)).await;

        // All senders are gone with the aborted tasks.
        assert!(rx.recv().await.is_none());
    }
}
