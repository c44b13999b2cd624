// File: tests/resolver_tests.rs
use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use pubcal::model::parser::{ParseOptions, parse};
use pubcal::model::recurrence::{ResolveOptions, Resolver};
use pubcal::model::{DedupKey, ResolvedEvent};
use std::collections::BTreeMap;

fn wrap(events: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{}END:VCALENDAR\r\n",
        events
    )
}

fn resolve_at(ics: &str, now: chrono::DateTime<Utc>) -> BTreeMap<DedupKey, ResolvedEvent> {
    let parsed = parse(ics.as_bytes(), "gazette.ics", &ParseOptions::default()).unwrap();
    Resolver::resolve(&parsed.records, &parsed.rules, now, &ResolveOptions::default())
}

// Tuesday 2025-01-07 10:00 in New York
fn tuesday_morning() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 7, 15, 0, 0).unwrap()
}

const WEEKLY_MONDAY: &str = "BEGIN:VEVENT\r
UID:gazette_master\r
SUMMARY:Gazette print run\r
DTSTART;TZID=America/New_York:20250106T090000\r
DTEND;TZID=America/New_York:20250106T100000\r
RRULE:FREQ=WEEKLY\r
END:VEVENT\r
";

#[test]
fn test_single_weekday_rule_is_idempotent() {
    let once = resolve_at(&wrap(WEEKLY_MONDAY), tuesday_morning());
    assert_eq!(once.len(), 1);

    let thrice = resolve_at(
        &wrap(&[WEEKLY_MONDAY, WEEKLY_MONDAY, WEEKLY_MONDAY].concat()),
        tuesday_morning(),
    );
    assert_eq!(thrice.len(), 1);

    let key = thrice.keys().next().unwrap();
    assert_eq!(
        key,
        &DedupKey::Weekly {
            source_id: "gazette".to_string(),
            weekday: 0,
            hour: 9,
            minute: 0,
        }
    );
}

#[test]
fn test_multi_weekday_rule_expands_to_one_event_per_day() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:ledger_master
SUMMARY:Ledger
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    assert_eq!(events.len(), 3);

    let mut weekdays: Vec<Weekday> = events
        .values()
        .map(|e| e.recurrence.unwrap().weekday)
        .collect();
    weekdays.sort_by_key(|w| w.num_days_from_monday());
    assert_eq!(weekdays, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);

    for event in events.values() {
        assert!(event.recurring);
        let local = event.start.local();
        assert_eq!(local.weekday(), event.recurrence.unwrap().weekday);
        assert_eq!(local.hour(), 9);
        assert!(local.date_naive() >= NaiveDate::from_ymd_opt(2025, 1, 7).unwrap());
    }
}

#[test]
fn test_stale_start_advances_to_same_weekday() {
    // A Monday in June 2024 (EDT), resolved in January 2025 (EST).
    let ics = wrap(
        "BEGIN:VEVENT
UID:weekly-review
SUMMARY:Review
DTSTART;TZID=America/New_York:20240603T090000
DTEND;TZID=America/New_York:20240603T103000
RRULE:FREQ=WEEKLY
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let event = events.values().next().unwrap();
    let start = event.start.local();

    assert_eq!(start.weekday(), Weekday::Mon);
    assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 13).unwrap());
    // Wall-clock time survives the DST change
    assert_eq!((start.hour(), start.minute()), (9, 0));
    assert_eq!((event.end.instant - event.start.instant).num_minutes(), 90);
}

#[test]
fn test_stale_start_on_todays_weekday_stays_today() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:tuesday-slot
DTSTART;TZID=America/New_York:20241203T080000
RRULE:FREQ=WEEKLY
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let event = events.values().next().unwrap();
    assert_eq!(
        event.start.local().date_naive(),
        NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
    );
}

#[test]
fn test_past_one_time_event_is_excluded() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:special-issue
DTSTART:20250101T120000Z
END:VEVENT
BEGIN:VEVENT
UID:later-issue
DTSTART:20250201T120000Z
END:VEVENT
BEGIN:VEVENT
UID:earlier-today
DTSTART:20250107T080000Z
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let uids: Vec<&str> = events.values().map(|e| e.uid.as_str()).collect();
    assert_eq!(events.len(), 2);
    assert!(uids.contains(&"later-issue"));
    // Same day counts as not past
    assert!(uids.contains(&"earlier-today"));
    assert!(events.values().all(|e| !e.recurring && e.recurrence.is_none()));
}

#[test]
fn test_first_record_wins_on_duplicate_slot() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:gazette_a
SUMMARY:First title
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
END:VEVENT
BEGIN:VEVENT
UID:gazette_b
SUMMARY:Second title
DTSTART;TZID=America/New_York:20241230T090000
RRULE:FREQ=WEEKLY;BYDAY=MO
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    assert_eq!(events.len(), 1);
    let event = events.values().next().unwrap();
    assert_eq!(event.summary, "First title");
    assert_eq!(event.uid, "gazette_a");
}

#[test]
fn test_instances_inherit_rule_from_side_table() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:courier_rule
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY;BYDAY=MO
END:VEVENT
BEGIN:VEVENT
UID:courier_20250109
SUMMARY:Thursday edition
DTSTART;TZID=America/New_York:20250109T140000
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    // The instance inherits BYDAY=MO, landing on a Monday at its own 14:00
    assert_eq!(events.len(), 2);
    assert!(events.values().all(|e| e.recurring));
    let afternoon = events
        .values()
        .find(|e| e.summary == "Thursday edition")
        .unwrap();
    assert_eq!(afternoon.weekday(), Weekday::Mon);
    assert_eq!(afternoon.start.local().hour(), 14);
}

#[test]
fn test_deadline_offset_default_and_explicit_zero() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:zero_1
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
X-DEADLINE-OFFSET:0
END:VEVENT
BEGIN:VEVENT
UID:absent_1
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let by_source = |id: &str| events.values().find(|e| e.source_id == id).unwrap();
    assert_eq!(by_source("zero").deadline_offset_days, 0);
    assert_eq!(by_source("absent").deadline_offset_days, 2);

    let parsed = parse(ics.as_bytes(), "x.ics", &ParseOptions::default()).unwrap();
    let custom = Resolver::resolve(
        &parsed.records,
        &parsed.rules,
        tuesday_morning(),
        &ResolveOptions {
            default_offset_days: 5,
        },
    );
    let absent = custom.values().find(|e| e.source_id == "absent").unwrap();
    assert_eq!(absent.deadline_offset_days, 5);
    let zero = custom.values().find(|e| e.source_id == "zero").unwrap();
    assert_eq!(zero.deadline_offset_days, 0);
}

#[test]
fn test_cancelled_events_are_dropped() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:paused_1
STATUS:CANCELLED
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
END:VEVENT
",
    );
    assert!(resolve_at(&ics, tuesday_morning()).is_empty());
}

#[test]
fn test_source_label_from_category_or_filename() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:a_1
CATEGORIES:Morning Post,News
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
END:VEVENT
BEGIN:VEVENT
UID:b_1
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let a = events.values().find(|e| e.source_id == "a").unwrap();
    let b = events.values().find(|e| e.source_id == "b").unwrap();
    assert_eq!(a.source_label, "Morning Post");
    assert_eq!(b.source_label, "gazette");
    assert_eq!(a.tz(), New_York);
}

#[test]
fn test_ruleless_block_sharing_logical_id_is_absorbed() {
    // The one-off on Monday 09:00 inherits the weekly rule and lands in the
    // master's slot, so it never shows up as a separate event.
    let ics = wrap(
        "BEGIN:VEVENT
UID:gazette_master
SUMMARY:Gazette
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY;BYDAY=MO
END:VEVENT
BEGIN:VEVENT
UID:gazette_20250120
SUMMARY:Gazette special
DTSTART;TZID=America/New_York:20250120T090000
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    assert_eq!(events.len(), 1);
    let event = events.values().next().unwrap();
    assert!(event.recurring);
    assert_eq!(event.summary, "Gazette");
}

#[test]
fn test_exact_uid_rule_wins_over_logical_rule() {
    let ics = wrap(
        "BEGIN:VEVENT
UID:gazette_master
DTSTART;TZID=America/New_York:20250106T090000
RRULE:FREQ=WEEKLY;BYDAY=MO
END:VEVENT
BEGIN:VEVENT
UID:gazette_friday
DTSTART;TZID=America/New_York:20250110T150000
RRULE:FREQ=WEEKLY;BYDAY=FR
END:VEVENT
BEGIN:VEVENT
UID:gazette_friday
SUMMARY:Friday override
DTSTART;TZID=America/New_York:20250110T170000
END:VEVENT
",
    );
    let events = resolve_at(&ics, tuesday_morning());
    let override_event = events
        .values()
        .find(|e| e.summary == "Friday override")
        .unwrap();
    // The logical-id rule would have put it on Monday
    assert_eq!(override_event.weekday(), Weekday::Fri);
    assert_eq!(override_event.start.local().hour(), 17);
    assert_eq!(events.len(), 3);
}
