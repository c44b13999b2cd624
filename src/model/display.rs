// File: ./src/model/display.rs
use crate::model::item::{ProjectedOccurrence, ResolvedEvent};
use chrono::Weekday;

pub trait OccurrenceDisplay {
    /// e.g. "Wednesday, January 8"
    fn run_label(&self) -> String;
    /// e.g. "Monday, January 6 12:00 PM EST"
    fn deadline_label(&self) -> String;
    fn to_line(&self) -> String;
}

impl OccurrenceDisplay for ProjectedOccurrence {
    fn run_label(&self) -> String {
        self.run.format("%A, %B %-d").to_string()
    }

    fn deadline_label(&self) -> String {
        // Abbreviation of the deadline date; may differ from the run's across DST.
        self.deadline.format("%A, %B %-d %-I:%M %p %Z").to_string()
    }

    fn to_line(&self) -> String {
        let offset = match self.offset_days {
            0 => "same day".to_string(),
            1 => "1 day before".to_string(),
            n => format!("{} days before", n),
        };
        format!(
            "{} ({}) | deadline {} [{}]",
            self.run_label(),
            self.tz_abbrev,
            self.deadline_label(),
            offset
        )
    }
}

pub fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

pub trait EventDisplay {
    fn to_line(&self) -> String;
}

impl EventDisplay for ResolvedEvent {
    fn to_line(&self) -> String {
        let start = self.start.local();
        let when = match &self.recurrence {
            Some(rule) => format!(
                "every {} {} {}",
                weekday_code(rule.weekday),
                start.format("%H:%M"),
                self.tz().name()
            ),
            None => format!("{} {}", start.format("%Y-%m-%d %H:%M"), self.tz().name()),
        };
        format!(
            "[{}] {} | {} | {} | offset {}d",
            self.source_label, self.source_id, self.summary, when, self.deadline_offset_days
        )
    }
}
