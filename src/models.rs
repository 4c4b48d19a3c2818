use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Task struct, as persisted under the `todos` key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: u64,
    pub task: String,
    pub timestamp: String,
    #[serde(with = "iso_millis")]
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub finished: bool,
}

// NewTask is a task that has not been assigned an id yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub task: String,
    pub timestamp: String,
    pub deadline: DateTime<Utc>,
}

/// The value triple that identifies tasks for the matching operations.
///
/// Several stored tasks may share one key; operations addressed by key
/// affect every match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskKey {
    pub task: String,
    pub timestamp: String,
    pub deadline: DateTime<Utc>,
}

impl Task {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            task: self.task.clone(),
            timestamp: self.timestamp.clone(),
            deadline: self.deadline,
        }
    }

    pub fn matches(&self, key: &TaskKey) -> bool {
        self.task == key.task && self.timestamp == key.timestamp && self.deadline == key.deadline
    }
}

impl NewTask {
    /// Builds a task stamped with `created`, formatted by `timestamp_format`.
    pub fn new(
        task: impl Into<String>,
        created: DateTime<chrono::Local>,
        timestamp_format: &str,
        deadline: DateTime<Utc>,
    ) -> NewTask {
        NewTask {
            task: task.into(),
            timestamp: created.format(timestamp_format).to_string(),
            deadline: truncate_to_millis(deadline),
        }
    }

    pub fn with_id(self, id: u64) -> Task {
        Task {
            id,
            task: self.task,
            timestamp: self.timestamp,
            deadline: self.deadline,
            finished: false,
        }
    }
}

/// Drops sub-millisecond precision so a deadline survives the ISO round trip.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

mod iso_millis {
    use super::*;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        // Years past 9999 are written with a sign, which strict RFC 3339 refuses.
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .or_else(|_| raw.parse::<DateTime<Utc>>())
            .map_err(serde::de::Error::custom)
    }
}
