// File: ./src/model/item.rs
use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separates the logical source id from the instance suffix inside a UID.
pub const ID_DELIMITER: char = '_';

pub const DEFAULT_DEADLINE_OFFSET_DAYS: u32 = 2;

// --- IDENTIFIERS ---

/// A UID split once into the publication key and the per-instance suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub logical: String,
    pub instance: Option<String>,
}

impl EventId {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(ID_DELIMITER) {
            Some((logical, instance)) if !logical.is_empty() => Self {
                logical: logical.to_string(),
                instance: Some(instance.to_string()),
            },
            _ => Self {
                logical: raw.to_string(),
                instance: None,
            },
        }
    }

    /// The UID exactly as it appeared in the calendar.
    pub fn raw(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}{}{}", self.logical, ID_DELIMITER, instance),
            None => self.logical.clone(),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum EventStatus {
    Tentative,
    #[default]
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn from_ical(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub key: String,
    pub value: String,
    pub params: Vec<(String, String)>,
}

// --- PARSER OUTPUT ---

#[derive(Debug, Clone, PartialEq)]
pub struct RawEventRecord {
    pub id: EventId,
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub all_day: bool,
    pub rrule: Option<String>,
    pub categories: Vec<String>,
    /// `None` when the deadline-offset property is absent; `Some(0)` is same-day.
    pub deadline_offset: Option<u32>,
    pub status: EventStatus,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    /// First category, or the calendar's file stem.
    pub source_label: String,
    pub unmapped_properties: Vec<RawProperty>,
}

// --- RESOLVED EVENTS ---

/// An instant paired with the IANA zone it was expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zoned {
    pub instant: DateTime<Utc>,
    pub tz: Tz,
}

impl Zoned {
    pub fn new(dt: DateTime<Tz>) -> Self {
        Self {
            instant: dt.with_timezone(&Utc),
            tz: dt.timezone(),
        }
    }

    pub fn local(&self) -> DateTime<Tz> {
        self.instant.with_timezone(&self.tz)
    }
}

/// Single-weekday recurrence descriptor left after multi-day expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayRule {
    pub weekday: Weekday,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub source_id: String,
    pub uid: String,
    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: Zoned,
    pub end: Zoned,
    pub recurrence: Option<WeekdayRule>,
    pub recurring: bool,
    pub deadline_offset_days: u32,
    pub source_label: String,
}

impl ResolvedEvent {
    pub fn tz(&self) -> Tz {
        self.start.tz
    }

    pub fn weekday(&self) -> Weekday {
        match &self.recurrence {
            Some(rule) => rule.weekday,
            None => self.start.local().weekday(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        if self.recurring {
            let local = self.start.local();
            DedupKey::Weekly {
                source_id: self.source_id.clone(),
                weekday: self.weekday().num_days_from_monday(),
                hour: local.hour(),
                minute: local.minute(),
            }
        } else {
            DedupKey::Once {
                uid: self.uid.clone(),
                start: self.start.instant,
            }
        }
    }
}

/// Collapses repeated parses of the same slot onto one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    Weekly {
        source_id: String,
        /// Days from Monday (0..=6).
        weekday: u32,
        hour: u32,
        minute: u32,
    },
    Once {
        uid: String,
        start: DateTime<Utc>,
    },
}

// --- PROJECTION OUTPUT ---

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedOccurrence {
    pub run: DateTime<Tz>,
    pub deadline: DateTime<Tz>,
    pub tz: Tz,
    /// Abbreviation in effect on the run date (e.g. EST vs EDT).
    pub tz_abbrev: String,
    pub offset_days: u32,
}

// --- TIME HELPERS ---

/// Resolves a wall-clock time in `tz`. Ambiguous times take the earlier instant;
/// times inside a DST gap are pushed forward past the gap.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = naive;
    for _ in 0..8 {
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt;
        }
        candidate += Duration::minutes(30);
    }
    tz.from_utc_datetime(&naive)
}

/// `date` minus `days`, or `None` when that falls outside chrono's range.
pub fn days_before(date: NaiveDate, days: u32) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
}

pub fn at_hour(tz: &Tz, date: NaiveDate, hour: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    localize(tz, date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn test_event_id_split_on_first_delimiter() {
        let id = EventId::parse("weekly-gazette_20250106T120000Z_extra");
        assert_eq!(id.logical, "weekly-gazette");
        assert_eq!(id.instance.as_deref(), Some("20250106T120000Z_extra"));
        assert_eq!(id.raw(), "weekly-gazette_20250106T120000Z_extra");
    }

    #[test]
    fn test_event_id_without_delimiter() {
        let id = EventId::parse("plain-uid@example.com");
        assert_eq!(id.logical, "plain-uid@example.com");
        assert!(id.instance.is_none());

        // A leading delimiter does not produce an empty logical id
        let id = EventId::parse("_orphan");
        assert_eq!(id.logical, "_orphan");
    }

    #[test]
    fn test_localize_skips_spring_forward_gap() {
        // 2025-03-09 02:30 does not exist in New York
        let naive = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = localize(&New_York, naive);
        assert_eq!(dt.hour(), 3);
        assert_eq!(dt.date_naive(), naive.date());
    }

    #[test]
    fn test_noon_across_dst_is_71_hours_apart() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let before = at_hour(&New_York, days_before(monday, 3).unwrap(), 12);
        let after = at_hour(&New_York, monday, 12);
        assert_eq!(before.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        assert_eq!(after.hour(), 12);
        // 3 calendar days minus the lost hour
        assert_eq!((after - before).num_hours(), 71);
    }

    #[test]
    fn test_days_before_out_of_range() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        assert_eq!(days_before(date, 0), Some(date));
        assert!(days_before(date, u32::MAX).is_none());
    }
}
