// File: src/model/adapter.rs
// Renders projected submission windows back into iCalendar text.
use crate::model::item::ProjectedOccurrence;
use chrono::{DateTime, Utc};
use icalendar::{Calendar, Component, Event};

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// One VEVENT per occurrence, spanning from the submission deadline to the run.
pub fn occurrences_to_ics(
    source_id: &str,
    summary: &str,
    occurrences: &[ProjectedOccurrence],
    now: DateTime<Utc>,
) -> String {
    let mut calendar = Calendar::new();

    for occ in occurrences {
        let mut event = Event::new();
        event.uid(&format!("{}_{}", source_id, occ.run.format("%Y%m%d")));
        event.summary(&format!("{} submission deadline", summary));
        event.description(&format!(
            "Runs {} ({}). Deadline {} day(s) before.",
            occ.run.format("%Y-%m-%d %H:%M"),
            occ.tz_abbrev,
            occ.offset_days
        ));
        event.timestamp(now);
        event.add_property("DTSTART", format_utc(occ.deadline.with_timezone(&Utc)));
        event.add_property("DTEND", format_utc(occ.run.with_timezone(&Utc)));
        event.add_property("X-DEADLINE-OFFSET", occ.offset_days.to_string());
        event.add_property("CATEGORIES", source_id);
        calendar.push(event);
    }

    calendar.to_string()
}
