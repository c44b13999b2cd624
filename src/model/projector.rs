// File: ./src/model/projector.rs
// Walks a weekly submission pattern forward to concrete run dates and deadlines.
use crate::error::CalError;
use crate::model::item::{ProjectedOccurrence, ResolvedEvent, at_hour, days_before};
use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DISPLAY_HOUR: u32 = 12;
pub const DEFAULT_HORIZON_DAYS: u32 = 366;

/// What to do when recurring events of one source disagree on their zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezonePolicy {
    #[default]
    Strict,
    FirstWins,
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectOptions {
    pub display_hour: u32,
    pub horizon_days: u32,
    pub timezone_policy: TimezonePolicy,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            display_hour: DISPLAY_HOUR,
            horizon_days: DEFAULT_HORIZON_DAYS,
            timezone_policy: TimezonePolicy::Strict,
        }
    }
}

/// Filters a whole calendar down to one logical source, then projects it.
pub fn project_source(
    events: &[ResolvedEvent],
    source_id: &str,
    count: usize,
    now: DateTime<Utc>,
    options: &ProjectOptions,
) -> Result<Vec<ProjectedOccurrence>, CalError> {
    let own: Vec<ResolvedEvent> = events
        .iter()
        .filter(|e| e.source_id == source_id)
        .cloned()
        .collect();
    project(&own, count, now, options)
}

/// Next `count` run dates whose deadline is still after `now`, ascending.
/// One-time events in `events` are ignored.
pub fn project(
    events: &[ResolvedEvent],
    count: usize,
    now: DateTime<Utc>,
    options: &ProjectOptions,
) -> Result<Vec<ProjectedOccurrence>, CalError> {
    let recurring: Vec<&ResolvedEvent> = events.iter().filter(|e| e.recurring).collect();
    let Some(first) = recurring.first() else {
        log::debug!("No recurring events to project");
        return Ok(Vec::new());
    };
    if count == 0 {
        return Ok(Vec::new());
    }

    let tz = shared_timezone(&recurring, options.timezone_policy)?;

    let mut offsets: HashMap<Weekday, u32> = HashMap::new();
    let mut until: HashMap<Weekday, Option<DateTime<Utc>>> = HashMap::new();
    for event in &recurring {
        let weekday = event.weekday();
        offsets.entry(weekday).or_insert(event.deadline_offset_days);
        until
            .entry(weekday)
            .or_insert_with(|| event.recurrence.and_then(|r| r.until));
    }

    let today = now.with_timezone(&tz).date_naive();
    let earliest = recurring
        .iter()
        .map(|e| e.start.instant.with_timezone(&tz).date_naive())
        .min()
        .unwrap_or(today);
    let mut cursor = std::cmp::max(today, earliest);

    let mut out: Vec<ProjectedOccurrence> = Vec::with_capacity(count);
    for _ in 0..options.horizon_days {
        if out.len() >= count {
            break;
        }
        let weekday = cursor.weekday();
        if let Some(offset) = offsets.get(&weekday).copied()
            && let Some(deadline_date) = days_before(cursor, offset)
        {
            let run = at_hour(&tz, cursor, options.display_hour);
            let deadline = at_hour(&tz, deadline_date, options.display_hour);

            let ended = until
                .get(&weekday)
                .copied()
                .flatten()
                .is_some_and(|u| run.with_timezone(&Utc) > u);
            let duplicate = out.last().is_some_and(|prev| prev.run == run);

            if deadline.with_timezone(&Utc) > now && !ended && !duplicate {
                out.push(ProjectedOccurrence {
                    tz_abbrev: run.format("%Z").to_string(),
                    run,
                    deadline,
                    tz,
                    offset_days: offset,
                });
            }
        }
        match cursor.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    if out.len() < count {
        log::debug!(
            "Found {} of {} occurrences for {} within {} days",
            out.len(),
            count,
            first.source_id,
            options.horizon_days
        );
    }
    Ok(out)
}

fn shared_timezone(events: &[&ResolvedEvent], policy: TimezonePolicy) -> Result<Tz, CalError> {
    let first = events[0].tz();
    let mut zones: Vec<Tz> = vec![first];
    for event in events {
        if !zones.contains(&event.tz()) {
            zones.push(event.tz());
        }
    }
    if zones.len() == 1 {
        return Ok(first);
    }

    let names: Vec<String> = zones.iter().map(|z| z.name().to_string()).collect();
    match policy {
        TimezonePolicy::Strict => Err(CalError::AmbiguousTimezone {
            source_id: events[0].source_id.clone(),
            zones: names,
        }),
        TimezonePolicy::FirstWins => {
            log::warn!(
                "Events of '{}' mix timezones ({}); using {}",
                events[0].source_id,
                names.join(", "),
                first.name()
            );
            Ok(first)
        }
    }
}

/// One-time events of a source that have not started yet, soonest first.
pub fn upcoming_one_time<'a>(
    events: &'a [ResolvedEvent],
    source_id: &str,
    now: DateTime<Utc>,
) -> Vec<&'a ResolvedEvent> {
    let mut list: Vec<&ResolvedEvent> = events
        .iter()
        .filter(|e| !e.recurring && e.source_id == source_id && e.end.instant >= now)
        .collect();
    list.sort_by_key(|e| e.start.instant);
    list
}
