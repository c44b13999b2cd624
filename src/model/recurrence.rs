// File: ./src/model/recurrence.rs
use crate::model::item::{
    DEFAULT_DEADLINE_OFFSET_DAYS, DedupKey, EventStatus, RawEventRecord, ResolvedEvent,
    WeekdayRule, Zoned, localize,
};
use crate::model::parser::{ParsedCalendar, RuleTable};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use rrule::{NWeekday, RRule, Unvalidated};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Applied when a record has no deadline-offset property.
    pub default_offset_days: u32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            default_offset_days: DEFAULT_DEADLINE_OFFSET_DAYS,
        }
    }
}

/// The parts of an RRULE the weekly projection cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyPattern {
    pub weekdays: Vec<Weekday>,
    pub until: Option<DateTime<Utc>>,
}

impl WeeklyPattern {
    /// Parses `rule_str`. A date-only or floating UNTIL is read in `tz`; a date-only
    /// UNTIL covers that whole day.
    pub fn from_rule(rule_str: &str, tz: &Tz) -> Option<Self> {
        // Stored rules sometimes keep their "RRULE:" prefix.
        let clean_rule = rule_str.trim();
        let clean_rule = if clean_rule.to_uppercase().starts_with("RRULE:") {
            &clean_rule[6..]
        } else {
            clean_rule
        };

        let rule: RRule<Unvalidated> = match clean_rule.parse() {
            Ok(rule) => rule,
            Err(e) => {
                log::warn!("Unparseable RRULE '{}': {}", rule_str, e);
                return None;
            }
        };

        let mut weekdays = Vec::new();
        for nday in rule.get_by_weekday() {
            let wd = match nday {
                NWeekday::Every(wd) => *wd,
                NWeekday::Nth(_, wd) => *wd,
            };
            if !weekdays.contains(&wd) {
                weekdays.push(wd);
            }
        }

        let until = until_part(clean_rule).and_then(|raw| {
            local_until(raw, tz).or_else(|| rule.get_until().map(|u| u.with_timezone(&Utc)))
        });

        Some(Self { weekdays, until })
    }
}

fn until_part(rule: &str) -> Option<&str> {
    rule.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim().eq_ignore_ascii_case("UNTIL").then_some(value.trim())
    })
}

/// UNTIL values without a trailing `Z`, resolved in the event's zone.
fn local_until(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if raw.ends_with('Z') || raw.ends_with('z') {
        return None;
    }
    if raw.len() == 8 {
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
        let end_of_day = date.and_hms_opt(23, 59, 59)?;
        return Some(localize(tz, end_of_day).with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").ok()?;
    Some(localize(tz, naive).with_timezone(&Utc))
}

/// First date on or after `date` that falls on `weekday`.
pub fn next_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(ahead as i64)
}

pub struct Resolver;

impl Resolver {
    pub fn resolve_calendar(
        parsed: &ParsedCalendar,
        now: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> BTreeMap<DedupKey, ResolvedEvent> {
        Self::resolve(&parsed.records, &parsed.rules, now, options)
    }

    /// Folds raw records into one entry per dedup key. First write wins.
    pub fn resolve(
        records: &[RawEventRecord],
        rules: &RuleTable,
        now: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> BTreeMap<DedupKey, ResolvedEvent> {
        let mut resolved = BTreeMap::new();

        for record in records {
            if record.status == EventStatus::Cancelled {
                log::debug!("Skipping cancelled event {}", record.id);
                continue;
            }

            let rule = record
                .rrule
                .as_deref()
                .or_else(|| rules.lookup(&record.id));

            let events = match rule {
                Some(rule_str) => Self::expand_recurring(record, rule_str, now, options),
                None => Self::one_time(record, now, options).into_iter().collect(),
            };

            for event in events {
                match resolved.entry(event.dedup_key()) {
                    Entry::Vacant(slot) => {
                        slot.insert(event);
                    }
                    Entry::Occupied(existing) => {
                        log::debug!(
                            "Dropping duplicate of {:?} from {}",
                            existing.key(),
                            record.id
                        );
                    }
                }
            }
        }

        resolved
    }

    fn one_time(
        record: &RawEventRecord,
        now: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> Option<ResolvedEvent> {
        let today = now.with_timezone(&record.start.timezone()).date_naive();
        if record.start.date_naive() < today {
            return None;
        }
        Some(Self::build(record, record.start, record.end, None, options))
    }

    /// One entry per governed weekday, each moved to its nearest date on or after
    /// max(start day, today) with the original time-of-day.
    fn expand_recurring(
        record: &RawEventRecord,
        rule_str: &str,
        now: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> Vec<ResolvedEvent> {
        let tz: Tz = record.start.timezone();
        let today = now.with_timezone(&tz).date_naive();
        let floor = std::cmp::max(record.start.date_naive(), today);
        let duration = record.end - record.start;

        let pattern = WeeklyPattern::from_rule(rule_str, &tz).unwrap_or_default();
        let weekdays = if pattern.weekdays.is_empty() {
            vec![record.start.weekday()]
        } else {
            pattern.weekdays.clone()
        };

        weekdays
            .into_iter()
            .map(|weekday| {
                let date = next_weekday_on_or_after(floor, weekday);
                let start = localize(&tz, date.and_time(record.start.time()));
                let rule = WeekdayRule {
                    weekday,
                    until: pattern.until,
                };
                Self::build(record, start, start + duration, Some(rule), options)
            })
            .collect()
    }

    fn build(
        record: &RawEventRecord,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        recurrence: Option<WeekdayRule>,
        options: &ResolveOptions,
    ) -> ResolvedEvent {
        ResolvedEvent {
            source_id: record.id.logical.clone(),
            uid: record.id.raw(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            location: record.location.clone(),
            start: Zoned::new(start),
            end: Zoned::new(end),
            recurring: recurrence.is_some(),
            recurrence,
            deadline_offset_days: record
                .deadline_offset
                .unwrap_or(options.default_offset_days),
            source_label: record.source_label.clone(),
        }
    }
}
