// File: ./src/model/parser.rs
// Line-oriented reader for the VEVENT subset of iCalendar text.
use crate::error::CalError;
use crate::model::item::{EventId, EventStatus, RawEventRecord, RawProperty, localize};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::str::FromStr;
use strum::EnumString;

/// Property names the resolver consumes. Everything else lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PropertyKind {
    #[strum(serialize = "DTSTART")]
    Start,
    #[strum(serialize = "DTEND")]
    End,
    #[strum(serialize = "SUMMARY")]
    Summary,
    #[strum(serialize = "DESCRIPTION")]
    Description,
    #[strum(serialize = "LOCATION")]
    Location,
    #[strum(serialize = "UID")]
    Uid,
    #[strum(serialize = "STATUS")]
    Status,
    #[strum(serialize = "RRULE")]
    RecurrenceRule,
    #[strum(serialize = "CATEGORIES")]
    Categories,
    #[strum(serialize = "CREATED")]
    Created,
    #[strum(serialize = "LAST-MODIFIED")]
    LastModified,
    #[strum(serialize = "X-DEADLINE-OFFSET")]
    DeadlineOffset,
    #[strum(default)]
    Other(String),
}

impl PropertyKind {
    pub fn classify(name: &str) -> Self {
        PropertyKind::from_str(name).unwrap_or_else(|_| PropertyKind::Other(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Zone used when a timestamp has neither a TZID nor a trailing `Z`.
    pub default_tz: Tz,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

/// Diagnostics for the parts of the input that were skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub blocks: usize,
    pub skipped_blocks: usize,
    pub skipped_lines: usize,
}

/// Maps UIDs (exact and logical) to the first RRULE found for them anywhere in the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    rules: HashMap<String, String>,
}

impl RuleTable {
    pub fn build(text: &str) -> Self {
        let mut rules = HashMap::new();
        let mut in_event = false;
        let mut depth = 0usize;
        let mut uid: Option<String> = None;
        let mut rrule: Option<String> = None;

        for line in unfold(text) {
            match marker(&line) {
                Some(Marker::Begin(name)) if name == "VEVENT" => {
                    in_event = true;
                    depth = 0;
                    uid = None;
                    rrule = None;
                }
                Some(Marker::End(name)) if name == "VEVENT" => {
                    if in_event && let (Some(u), Some(r)) = (uid.take(), rrule.take()) {
                        let id = EventId::parse(&u);
                        rules.entry(id.logical.clone()).or_insert_with(|| r.clone());
                        rules.entry(id.raw()).or_insert(r);
                    }
                    in_event = false;
                }
                Some(Marker::Begin(_)) if in_event => depth += 1,
                Some(Marker::End(_)) if in_event => depth = depth.saturating_sub(1),
                _ if in_event && depth == 0 => {
                    if let Some(cl) = ContentLine::parse(&line) {
                        match PropertyKind::classify(&cl.name) {
                            PropertyKind::Uid if uid.is_none() => {
                                uid = Some(cl.value.trim().to_string())
                            }
                            PropertyKind::RecurrenceRule if rrule.is_none() => {
                                rrule = Some(cl.value.trim().to_string())
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Self { rules }
    }

    /// Exact UID first, then the logical id.
    pub fn lookup(&self, id: &EventId) -> Option<&str> {
        self.rules
            .get(&id.raw())
            .or_else(|| self.rules.get(&id.logical))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedCalendar {
    pub records: Vec<RawEventRecord>,
    pub rules: RuleTable,
    pub report: ParseReport,
    /// Fallback display label derived from the source identifier.
    pub calendar_label: String,
}

pub fn parse(
    raw: &[u8],
    source_identifier: &str,
    options: &ParseOptions,
) -> Result<ParsedCalendar, CalError> {
    let text = std::str::from_utf8(raw)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let rules = RuleTable::build(text);
    let calendar_label = label_from_source(source_identifier);

    let mut report = ParseReport::default();
    let mut records = Vec::new();
    let mut block: Option<BlockBuilder> = None;
    let mut depth = 0usize;

    for line in unfold(text) {
        if line.trim().is_empty() {
            continue;
        }
        match marker(&line) {
            Some(Marker::Begin(name)) if name == "VEVENT" => {
                if block.is_some() {
                    // Previous VEVENT never closed.
                    report.skipped_blocks += 1;
                }
                block = Some(BlockBuilder::default());
                depth = 0;
                report.blocks += 1;
                continue;
            }
            Some(Marker::End(name)) if name == "VEVENT" => {
                if let Some(builder) = block.take() {
                    match builder.finish(&calendar_label) {
                        Some(record) => records.push(record),
                        None => report.skipped_blocks += 1,
                    }
                }
                continue;
            }
            _ => {}
        }

        let Some(current) = block.as_mut() else {
            continue;
        };

        match marker(&line) {
            Some(Marker::Begin(_)) => depth += 1,
            Some(Marker::End(_)) => depth = depth.saturating_sub(1),
            None if depth > 0 => {}
            None => {
                let accepted = ContentLine::parse(&line)
                    .map(|cl| current.apply(cl, options))
                    .unwrap_or(false);
                if !accepted {
                    report.skipped_lines += 1;
                }
            }
        }
    }

    if block.is_some() {
        report.skipped_blocks += 1;
    }

    Ok(ParsedCalendar {
        records,
        rules,
        report,
        calendar_label,
    })
}

// --- LINES ---

/// Joins RFC 5545 continuation lines (leading space or tab) onto their predecessor.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for raw_line in text.lines() {
        let raw_line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if raw_line.starts_with(' ') || raw_line.starts_with('\t') {
            current.push_str(&raw_line[1..]);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(raw_line);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

enum Marker {
    Begin(String),
    End(String),
}

fn marker(line: &str) -> Option<Marker> {
    let (name, value) = line.trim().split_once(':')?;
    let value = value.trim().to_uppercase();
    if name.eq_ignore_ascii_case("BEGIN") {
        Some(Marker::Begin(value))
    } else if name.eq_ignore_ascii_case("END") {
        Some(Marker::End(value))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl ContentLine {
    /// Splits `NAME;PARAM=VALUE:VALUE`, honouring double-quoted parameter values.
    pub fn parse(line: &str) -> Option<Self> {
        let mut in_quotes = false;
        let mut colon = None;
        for (idx, c) in line.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ':' if !in_quotes => {
                    colon = Some(idx);
                    break;
                }
                _ => {}
            }
        }
        let colon = colon?;
        let head = &line[..colon];
        let value = &line[colon + 1..];

        let mut parts = split_unquoted(head, ';').into_iter();
        let name = parts.next()?.trim().to_string();
        if name.is_empty() {
            return None;
        }

        let params = parts
            .filter_map(|p| {
                let (k, v) = p.split_once('=')?;
                Some((k.trim().to_uppercase(), v.trim().trim_matches('"').to_string()))
            })
            .collect();

        Some(Self {
            name,
            params,
            value: value.to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

// --- VALUES ---

pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Splits on `sep` unless it is backslash-escaped, then unescapes each part.
fn split_escaped_list(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| unescape_text(p.trim()))
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn parse_tzid(tzid: &str) -> Option<Tz> {
    let cleaned = tzid.trim().trim_matches('"');
    Tz::from_str(cleaned).ok().or_else(|| {
        // Some producers prefix a vendor path, e.g. "/mozilla.org/20050126_1/Europe/Paris"
        let mut segments: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();
        while segments.len() > 1 {
            segments.remove(0);
            if let Ok(tz) = Tz::from_str(&segments.join("/")) {
                return Some(tz);
            }
        }
        None
    })
}

/// Parses a DATE or DATE-TIME value into a zoned timestamp.
/// Returns the timestamp and whether it was a date-only (all-day) value.
pub fn parse_ical_datetime(
    value: &str,
    tzid: Option<&str>,
    default_tz: &Tz,
) -> Option<(DateTime<Tz>, bool)> {
    let value = value.trim();

    let explicit_tz = tzid.map(|id| {
        parse_tzid(id).unwrap_or_else(|| {
            log::warn!("Unknown TZID '{}', falling back to {}", id, default_tz.name());
            *default_tz
        })
    });

    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        let tz = explicit_tz.unwrap_or(*default_tz);
        return Some((localize(&tz, date.and_time(NaiveTime::MIN)), true));
    }

    if let Some(body) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        let naive = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S").ok()?;
        let utc = Utc.from_utc_datetime(&naive);
        let tz = explicit_tz.unwrap_or(Tz::UTC);
        return Some((utc.with_timezone(&tz), false));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    let tz = explicit_tz.unwrap_or(*default_tz);
    Some((localize(&tz, naive), false))
}

/// Display label taken from the last path or URL segment, without `.ics`.
pub fn label_from_source(source: &str) -> String {
    let trimmed = source.trim().trim_end_matches(['/', '\\']);
    let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let name = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query);
    let stem = if name.to_lowercase().ends_with(".ics") {
        &name[..name.len() - 4]
    } else {
        name
    };
    if stem.is_empty() {
        source.trim().to_string()
    } else {
        stem.to_string()
    }
}

// --- BLOCKS ---

#[derive(Debug, Default)]
struct BlockBuilder {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<(DateTime<Tz>, bool)>,
    end: Option<DateTime<Tz>>,
    rrule: Option<String>,
    categories: Vec<String>,
    deadline_offset: Option<u32>,
    status: EventStatus,
    created: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
    unmapped: Vec<RawProperty>,
}

impl BlockBuilder {
    /// Folds one content line into the block. Returns false when the value is unusable.
    fn apply(&mut self, line: ContentLine, options: &ParseOptions) -> bool {
        let tzid = line.param("TZID").map(str::to_string);
        let parse_dt =
            |v: &str| parse_ical_datetime(v, tzid.as_deref(), &options.default_tz);

        match PropertyKind::classify(&line.name) {
            PropertyKind::Start => match parse_dt(&line.value) {
                Some(parsed) => self.start = Some(parsed),
                None => return false,
            },
            PropertyKind::End => match parse_dt(&line.value) {
                Some((dt, _)) => self.end = Some(dt),
                None => return false,
            },
            PropertyKind::Summary => self.summary = Some(unescape_text(&line.value)),
            PropertyKind::Description => self.description = Some(unescape_text(&line.value)),
            PropertyKind::Location => self.location = Some(unescape_text(&line.value)),
            PropertyKind::Uid => {
                let uid = line.value.trim();
                if uid.is_empty() {
                    return false;
                }
                self.uid = Some(uid.to_string());
            }
            PropertyKind::Status => self.status = EventStatus::from_ical(&line.value),
            PropertyKind::RecurrenceRule => {
                let rule = line.value.trim();
                if rule.is_empty() {
                    return false;
                }
                if self.rrule.is_none() {
                    self.rrule = Some(rule.to_string());
                }
            }
            PropertyKind::Categories => {
                self.categories.extend(split_escaped_list(&line.value, ','));
            }
            PropertyKind::Created => match parse_dt(&line.value) {
                Some((dt, _)) => self.created = Some(dt.with_timezone(&Utc)),
                None => return false,
            },
            PropertyKind::LastModified => match parse_dt(&line.value) {
                Some((dt, _)) => self.last_modified = Some(dt.with_timezone(&Utc)),
                None => return false,
            },
            PropertyKind::DeadlineOffset => match line.value.trim().parse::<u32>() {
                Ok(days) => self.deadline_offset = Some(days),
                Err(_) => return false,
            },
            PropertyKind::Other(name) => self.unmapped.push(RawProperty {
                key: name.to_uppercase(),
                value: line.value,
                params: line.params,
            }),
        }
        true
    }

    fn finish(self, calendar_label: &str) -> Option<RawEventRecord> {
        let uid = self.uid?;
        let (start, all_day) = self.start?;
        let end = match self.end {
            Some(end) if end >= start => end,
            _ if all_day => start + Duration::days(1),
            _ => start,
        };

        let source_label = self
            .categories
            .first()
            .cloned()
            .unwrap_or_else(|| calendar_label.to_string());

        Some(RawEventRecord {
            id: EventId::parse(&uid),
            summary: self.summary.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            location: self.location,
            start,
            end,
            all_day,
            rrule: self.rrule,
            categories: self.categories,
            deadline_offset: self.deadline_offset,
            status: self.status,
            created: self.created,
            last_modified: self.last_modified,
            source_label,
            unmapped_properties: self.unmapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::New_York;

    fn parse_str(ics: &str) -> ParsedCalendar {
        parse(ics.as_bytes(), "calendars/the-ledger.ics", &ParseOptions::default())
            .expect("parse failed")
    }

    #[test]
    fn test_property_kind_catch_all() {
        assert_eq!(PropertyKind::classify("dtstart"), PropertyKind::Start);
        assert_eq!(
            PropertyKind::classify("X-DEADLINE-OFFSET"),
            PropertyKind::DeadlineOffset
        );
        assert_eq!(
            PropertyKind::classify("X-WR-CALNAME"),
            PropertyKind::Other("X-WR-CALNAME".to_string())
        );
    }

    #[test]
    fn test_content_line_quoted_param_with_colon() {
        let cl = ContentLine::parse("DTSTART;TZID=\"America/New_York\";X-A=\"a:b\":20250106T090000")
            .unwrap();
        assert_eq!(cl.name, "DTSTART");
        assert_eq!(cl.param("tzid"), Some("America/New_York"));
        assert_eq!(cl.param("X-A"), Some("a:b"));
        assert_eq!(cl.value, "20250106T090000");
    }

    #[test]
    fn test_unfold_joins_continuation_lines() {
        let lines = unfold("SUMMARY:Long\r\n  title\r\n\tcontinued\r\nUID:1\r\n");
        assert_eq!(lines, vec!["SUMMARY:Long titlecontinued", "UID:1"]);
    }

    #[test]
    fn test_zone_resolution_order() {
        let default_tz = New_York;
        let (dt, all_day) =
            parse_ical_datetime("20250106T090000", Some("Europe/Paris"), &default_tz).unwrap();
        assert_eq!(dt.timezone(), chrono_tz::Europe::Paris);
        assert_eq!(dt.hour(), 9);
        assert!(!all_day);

        let (dt, _) = parse_ical_datetime("20250106T090000Z", None, &default_tz).unwrap();
        assert_eq!(dt.timezone(), Tz::UTC);

        let (dt, _) = parse_ical_datetime("20250106T090000", None, &default_tz).unwrap();
        assert_eq!(dt.timezone(), New_York);

        let (dt, all_day) = parse_ical_datetime("20250106", None, &default_tz).unwrap();
        assert!(all_day);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_unknown_tzid_uses_default() {
        let (dt, _) =
            parse_ical_datetime("20250106T090000", Some("Mars/Olympus"), &New_York).unwrap();
        assert_eq!(dt.timezone(), New_York);
    }

    #[test]
    fn test_vendor_prefixed_tzid() {
        assert_eq!(
            parse_tzid("/mozilla.org/20050126_1/Europe/Paris"),
            Some(chrono_tz::Europe::Paris)
        );
    }

    #[test]
    fn test_label_from_source() {
        assert_eq!(label_from_source("calendars/the-ledger.ics"), "the-ledger");
        assert_eq!(
            label_from_source("https://example.com/feeds/Weekly.ICS?token=abc"),
            "Weekly"
        );
        assert_eq!(label_from_source("plain"), "plain");
    }

    #[test]
    fn test_parse_block_with_unknown_properties_and_bad_lines() {
        let ics = "BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:ledger_1
SUMMARY:Print run\\, weekly
DTSTART;TZID=America/New_York:20250106T120000
DTEND;TZID=America/New_York:20250106T130000
X-CUSTOM;FOO=bar:kept
X-DEADLINE-OFFSET:soon
this line has no colon
BEGIN:VALARM
TRIGGER:-PT10M
END:VALARM
END:VEVENT
END:VCALENDAR";
        let parsed = parse_str(ics);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.report.skipped_lines, 2);
        assert_eq!(parsed.report.skipped_blocks, 0);

        let rec = &parsed.records[0];
        assert_eq!(rec.summary, "Print run, weekly");
        assert_eq!(rec.id.logical, "ledger");
        assert!(rec.deadline_offset.is_none());
        assert_eq!(rec.source_label, "the-ledger");
        assert_eq!(rec.unmapped_properties.len(), 1);
        assert_eq!(rec.unmapped_properties[0].key, "X-CUSTOM");
        assert_eq!(
            rec.unmapped_properties[0].params,
            vec![("FOO".to_string(), "bar".to_string())]
        );
    }

    #[test]
    fn test_blocks_without_start_or_uid_are_counted() {
        let ics = "BEGIN:VEVENT
UID:no-start
END:VEVENT
BEGIN:VEVENT
DTSTART:20250106T120000Z
END:VEVENT
BEGIN:VEVENT
UID:unterminated
DTSTART:20250106T120000Z";
        let parsed = parse_str(ics);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.report.blocks, 3);
        assert_eq!(parsed.report.skipped_blocks, 3);
    }

    #[test]
    fn test_missing_end_defaults() {
        let ics = "BEGIN:VEVENT
UID:a
DTSTART;VALUE=DATE:20250106
END:VEVENT
BEGIN:VEVENT
UID:b
DTSTART:20250106T120000Z
END:VEVENT";
        let parsed = parse_str(ics);
        let all_day = &parsed.records[0];
        assert!(all_day.all_day);
        assert_eq!(all_day.end - all_day.start, Duration::days(1));
        let timed = &parsed.records[1];
        assert_eq!(timed.end, timed.start);
    }

    #[test]
    fn test_rule_table_matches_logical_id() {
        let ics = "BEGIN:VEVENT
UID:gazette_master
DTSTART:20250106T120000Z
RRULE:FREQ=WEEKLY;BYDAY=MO,TH
END:VEVENT
BEGIN:VEVENT
UID:gazette_20250109
DTSTART:20250109T120000Z
END:VEVENT";
        let parsed = parse_str(ics);
        let instance = &parsed.records[1];
        assert!(instance.rrule.is_none());
        assert_eq!(
            parsed.rules.lookup(&instance.id),
            Some("FREQ=WEEKLY;BYDAY=MO,TH")
        );
        assert_eq!(parsed.rules.lookup(&EventId::parse("other_1")), None);
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = parse(&[0xff, 0xfe, 0x00], "x.ics", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, CalError::MalformedInput(_)));
    }
}
