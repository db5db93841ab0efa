use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Record timestamps only; schedules use date + time-of-day.
pub type Ms = i64;

/// Text form of a calendar date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Text form of a time-of-day. Minute precision.
pub const TIME_FORMAT: &str = "%H:%M";

pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
}

/// Parse `HH:MM`. A seconds component is rejected, not truncated.
pub fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
}

/// Serde adapter that keeps time-of-day values in `HH:MM` form on the wire and in the WAL.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(super::TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// A bookable unit (a class) and the exclusive-use owner it is taught by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    /// Conflict key. Compared as an exact string.
    pub owner: String,
    pub active: bool,
    pub name: Option<String>,
}

/// Partial update of a resource. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub owner: Option<String>,
    pub active: Option<bool>,
    pub name: Option<String>,
}

/// A scheduled session. Cancelled entries are kept as tombstones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Ulid,
    pub resource_id: Ulid,
    /// Owner value captured when the entry was created.
    pub owner: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub current_bookings: u32,
    pub cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Caller-facing create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A validated candidate handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub resource_id: Ulid,
    pub owner: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Exclusivity key: one owner on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerDay {
    pub owner: String,
    pub date: NaiveDate,
}

impl OwnerDay {
    pub fn new(owner: &str, date: NaiveDate) -> Self {
        Self {
            owner: owner.to_string(),
            date,
        }
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceRegistered {
        id: Ulid,
        owner: String,
        active: bool,
        name: Option<String>,
    },
    ResourceUpdated {
        id: Ulid,
        owner: String,
        active: bool,
        name: Option<String>,
    },
    ScheduleCreated {
        entry: ScheduleEntry,
    },
    ScheduleCancelled {
        id: Ulid,
        reason: Option<String>,
        at: Ms,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ScheduleEntry {
        ScheduleEntry {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            owner: "Alice".into(),
            date: parse_date("2024-01-15").unwrap(),
            start: parse_time("09:00").unwrap(),
            end: parse_time("10:30").unwrap(),
            current_bookings: 0,
            cancelled: false,
            cancellation_reason: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn time_parsing_is_minute_precision() {
        assert_eq!(parse_time("09:05").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert!(parse_time("09:05:30").is_err());
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn date_parsing() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("15/01/2024").is_err());
    }

    #[test]
    fn entry_json_uses_hhmm() {
        let json = serde_json::to_value(entry()).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["start"], "09:00");
        assert_eq!(json["end"], "10:30");
        assert_eq!(json["cancellation_reason"], serde_json::Value::Null);
        assert_eq!(json["current_bookings"], 0);
    }

    #[test]
    fn entry_survives_bincode() {
        let e = entry();
        let bytes = bincode::serialize(&Event::ScheduleCreated { entry: e.clone() }).unwrap();
        let back: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, Event::ScheduleCreated { entry: e });
    }

    #[test]
    fn owner_day_keys_are_exact() {
        let d = parse_date("2024-01-15").unwrap();
        assert_eq!(OwnerDay::new("Alice", d), OwnerDay::new("Alice", d));
        assert_ne!(OwnerDay::new("Alice", d), OwnerDay::new("alice", d));
    }
}
