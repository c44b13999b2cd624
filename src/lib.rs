// Crate root library declaration and module exports.
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod storage;

use crate::config::Config;
use crate::error::CalError;
use crate::model::parser::{self, ParseOptions, ParseReport};
use crate::model::recurrence::{ResolveOptions, Resolver};
use crate::model::ResolvedEvent;
use chrono::{DateTime, Utc};

/// Options for the parse + resolve pass run on every cache miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub parse: ParseOptions,
    pub resolve: ResolveOptions,
}

impl From<&Config> for LoadOptions {
    fn from(config: &Config) -> Self {
        Self {
            parse: config.parse_options(),
            resolve: config.resolve_options(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCalendar {
    pub events: Vec<ResolvedEvent>,
    pub report: ParseReport,
}

/// Parses raw calendar bytes and resolves them into deduplicated events.
pub fn load_calendar(
    raw: &[u8],
    source_identifier: &str,
    now: DateTime<Utc>,
    options: &LoadOptions,
) -> Result<ResolvedCalendar, CalError> {
    let parsed = parser::parse(raw, source_identifier, &options.parse)?;
    if parsed.report.skipped_lines > 0 || parsed.report.skipped_blocks > 0 {
        log::debug!(
            "{}: skipped {} line(s) and {} of {} block(s)",
            source_identifier,
            parsed.report.skipped_lines,
            parsed.report.skipped_blocks,
            parsed.report.blocks
        );
    }
    let resolved = Resolver::resolve_calendar(&parsed, now, &options.resolve);
    Ok(ResolvedCalendar {
        events: resolved.into_values().collect(),
        report: parsed.report,
    })
}
