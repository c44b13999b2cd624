// File: ./src/model/mod.rs
pub mod adapter;
pub mod display;
pub mod item;
pub mod parser;
pub mod projector;
pub mod recurrence;

pub use item::{
    DedupKey, EventId, EventStatus, ProjectedOccurrence, RawEventRecord, ResolvedEvent,
    WeekdayRule, Zoned,
};
pub use parser::{ParseOptions, ParseReport, ParsedCalendar, RuleTable};
pub use projector::{ProjectOptions, TimezonePolicy};
pub use recurrence::{ResolveOptions, Resolver};
