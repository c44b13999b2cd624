use anyhow::{Context, Result};
use chrono::Utc;
use pubcal::LoadOptions;
use pubcal::cache::CalendarCache;
use pubcal::cli::{self, Command};
use pubcal::config::Config;
use pubcal::context::{AppContext, StandardContext};
use pubcal::model::adapter::occurrences_to_ics;
use pubcal::model::display::{EventDisplay, OccurrenceDisplay};
use pubcal::model::projector::{project_source, upcoming_one_time};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::env;
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli_args = cli::parse_args(&args)?;

    if cli_args.command == Command::Help {
        cli::print_help("pubcal");
        return Ok(());
    }

    let ctx = StandardContext::new(cli_args.root.clone());
    let config = Config::load_or_default(&ctx)?;

    let level = if cli_args.verbose {
        log::LevelFilter::Debug
    } else {
        config.log_level()
    };
    if let Err(e) = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Logging disabled: {}", e);
    }

    let now = Utc::now();
    let options = LoadOptions::from(&config);
    let mut cache = CalendarCache::load_snapshot(&ctx, config.cache_ttl(), now)
        .unwrap_or_else(|e| {
            log::warn!("Could not read cache snapshot: {}", e);
            CalendarCache::new(config.cache_ttl())
        });

    match cli_args.command {
        Command::Next {
            file,
            source_id,
            count,
        } => {
            let events = load(&mut cache, &file, now, &options)?;
            let count = count.unwrap_or(config.default_count);
            let occurrences =
                project_source(&events, &source_id, count, now, &config.project_options())?;
            if occurrences.is_empty() {
                println!("No upcoming submission windows for '{}'.", source_id);
            }
            for occ in &occurrences {
                println!("{}", occ.to_line());
            }
            for event in upcoming_one_time(&events, &source_id, now) {
                println!("one-time: {}", event.to_line());
            }
        }
        Command::Export {
            file,
            source_id,
            count,
        } => {
            let events = load(&mut cache, &file, now, &options)?;
            let count = count.unwrap_or(config.default_count);
            let occurrences =
                project_source(&events, &source_id, count, now, &config.project_options())?;
            let summary = events
                .iter()
                .find(|e| e.source_id == source_id)
                .map(|e| e.summary.clone())
                .unwrap_or_else(|| source_id.clone());
            println!(
                "{}",
                occurrences_to_ics(&source_id, &summary, &occurrences, now)
            );
        }
        Command::List { file } => {
            let raw = fs::read(&file)
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let calendar =
                pubcal::load_calendar(&raw, &file.to_string_lossy(), now, &options)?;
            for event in &calendar.events {
                println!("{}", event.to_line());
            }
            println!(
                "{} event(s) from {} block(s); skipped {} block(s), {} line(s)",
                calendar.events.len(),
                calendar.report.blocks,
                calendar.report.skipped_blocks,
                calendar.report.skipped_lines
            );
        }
        Command::Help => cli::print_help("pubcal"),
    }

    if let Err(e) = cache.save_snapshot(&ctx) {
        log::warn!("Could not write cache snapshot to {:?}: {}", ctx.get_cache_dir().ok(), e);
    }
    Ok(())
}

fn load(
    cache: &mut CalendarCache,
    file: &Path,
    now: chrono::DateTime<Utc>,
    options: &LoadOptions,
) -> Result<Vec<pubcal::model::ResolvedEvent>> {
    let id = file.to_string_lossy().to_string();
    let events = cache.get_or_fetch(&id, now, options, || Ok(fs::read(file)?))?;
    Ok(events.to_vec())
}
