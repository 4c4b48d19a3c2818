use crate::error::InputError;
use crate::models::truncate_to_millis;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

#[derive(Debug, PartialEq)]
pub struct ParsedTask {
    pub title: String,
    pub deadline: DateTime<Utc>,
}

// Years RFC 3339 can write without a sign.
const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Validates both form fields. The task text is checked first.
pub fn parse_task_input(
    title: &str,
    deadline: &str,
    now: DateTime<Local>,
) -> Result<ParsedTask, InputError> {
    let title = parse_task_title(title)?;
    let deadline = parse_deadline(deadline, now)?;
    Ok(ParsedTask { title, deadline })
}

pub fn parse_task_title(input: &str) -> Result<String, InputError> {
    let title = Regex::new(r"\s+")
        .unwrap()
        .replace_all(input, " ")
        .trim()
        .to_string();

    if title.is_empty() {
        Err(InputError::EmptyTask)
    } else {
        Ok(title)
    }
}

pub fn parse_deadline(input: &str, now: DateTime<Local>) -> Result<DateTime<Utc>, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::EmptyDeadline);
    }

    let invalid = || InputError::InvalidDeadline(input.to_string());

    if let Some(offset) = parse_relative(input) {
        let offset = offset.ok_or_else(invalid)?;
        let deadline = now.checked_add_signed(offset).ok_or_else(invalid)?;
        return within_range(deadline.with_timezone(&Utc)).ok_or_else(invalid);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return within_range(at.with_timezone(&Utc)).ok_or_else(invalid);
    }

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(invalid)?;

    // Times skipped by a DST change have no local instant.
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    within_range(local.with_timezone(&Utc)).ok_or_else(invalid)
}

fn within_range(deadline: DateTime<Utc>) -> Option<DateTime<Utc>> {
    YEARS.contains(&deadline.year()).then(|| truncate_to_millis(deadline))
}

/// `Some(None)` when the input looks relative but overflows.
fn parse_relative(input: &str) -> Option<Option<Duration>> {
    let relative_re = Regex::new(r"^(?:\+|in\s+)\s*((?:\d+\s*[dhms]\s*)+)$").unwrap();
    let unit_re = Regex::new(r"(\d+)\s*([dhms])").unwrap();

    let caps = relative_re.captures(input)?;
    let body = caps.get(1)?.as_str();

    let mut total: i64 = 0;
    for unit in unit_re.captures_iter(body) {
        let amount = match unit[1].parse::<i64>() {
            Ok(amount) => amount,
            Err(_) => return Some(None),
        };
        let scale = match &unit[2] {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            _ => 1,
        };
        total = match amount
            .checked_mul(scale)
            .and_then(|seconds| total.checked_add(seconds))
        {
            Some(total) => total,
            None => return Some(None),
        };
    }

    Some(Duration::try_seconds(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_parse_title_collapses_whitespace() {
        assert_eq!(
            parse_task_title("  Buy   whole\tmilk  ").unwrap(),
            "Buy whole milk"
        );
    }

    #[test]
    fn test_parse_empty_title() {
        assert_eq!(parse_task_title(""), Err(InputError::EmptyTask));
        assert_eq!(parse_task_title("   "), Err(InputError::EmptyTask));
    }

    #[test]
    fn test_empty_title_reported_before_deadline() {
        assert_eq!(
            parse_task_input("", "", now()),
            Err(InputError::EmptyTask)
        );
    }

    #[test]
    fn test_parse_empty_deadline() {
        assert_eq!(parse_deadline("", now()), Err(InputError::EmptyDeadline));
        assert_eq!(parse_deadline("  ", now()), Err(InputError::EmptyDeadline));
    }

    #[test]
    fn test_parse_datetime_local_format() {
        assert_eq!(
            parse_deadline("2024-06-02T17:30", now()).unwrap(),
            local(2024, 6, 2, 17, 30, 0)
        );
    }

    #[test]
    fn test_parse_space_separated_with_seconds() {
        assert_eq!(
            parse_deadline("2024-06-02 17:30:15", now()).unwrap(),
            local(2024, 6, 2, 17, 30, 15)
        );
    }

    #[test]
    fn test_parse_date_only_is_local_midnight() {
        assert_eq!(
            parse_deadline("2024-12-24", now()).unwrap(),
            local(2024, 12, 24, 0, 0, 0)
        );
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_deadline("2024-06-02T10:00:00.250+02:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap() + Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_parse_relative_offsets() {
        let base = now().with_timezone(&Utc);
        assert_eq!(
            parse_deadline("+1d2h30m", now()).unwrap(),
            base + Duration::seconds(86_400 + 7_200 + 1_800)
        );
        assert_eq!(
            parse_deadline("in 45m", now()).unwrap(),
            base + Duration::minutes(45)
        );
        assert_eq!(
            parse_deadline("+ 1h 15s", now()).unwrap(),
            base + Duration::seconds(3_615)
        );
    }

    #[test]
    fn test_parse_relative_overflow_is_invalid() {
        assert_eq!(
            parse_deadline("+99999999999999999d", now()),
            Err(InputError::InvalidDeadline("+99999999999999999d".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_deadline_past_year_9999() {
        assert_eq!(
            parse_deadline("+3000000d", now()),
            Err(InputError::InvalidDeadline("+3000000d".to_string()))
        );
        assert_eq!(
            parse_deadline("9999-12-31T23:59:59Z", now()).unwrap(),
            Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_parse_garbage_deadline() {
        assert_eq!(
            parse_deadline("next tuesday", now()),
            Err(InputError::InvalidDeadline("next tuesday".to_string()))
        );
        assert_eq!(
            parse_deadline("2024-13-01", now()),
            Err(InputError::InvalidDeadline("2024-13-01".to_string()))
        );
    }

    #[test]
    fn test_parse_task_input_combines_fields() {
        let parsed = parse_task_input(" Buy milk ", "in 1h", now()).unwrap();
        assert_eq!(
            parsed,
            ParsedTask {
                title: "Buy milk".to_string(),
                deadline: now().with_timezone(&Utc) + Duration::hours(1),
            }
        );
    }
}
