// File: ./src/cli.rs
//! Shared command-line interface logic: argument handling and help text.
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next {
        file: PathBuf,
        source_id: String,
        count: Option<usize>,
    },
    List {
        file: PathBuf,
    },
    Export {
        file: PathBuf,
        source_id: String,
        count: Option<usize>,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub root: Option<PathBuf>,
    pub verbose: bool,
}

/// Parses `args` without the binary name.
pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut root = None;
    let mut verbose = false;
    let mut positional: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" | "help" => {
                return Ok(CliArgs {
                    command: Command::Help,
                    root,
                    verbose,
                });
            }
            "-v" | "--verbose" => verbose = true,
            "-r" | "--root" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{} expects a path", arg))?;
                root = Some(PathBuf::from(path));
            }
            other => positional.push(other),
        }
    }

    let parse_count = |value: Option<&&str>| -> Result<Option<usize>> {
        value
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("Invalid count '{}'", v))
            })
            .transpose()
    };

    let command = match positional.as_slice() {
        [] => Command::Help,
        ["next", file, source_id, rest @ ..] if rest.len() <= 1 => Command::Next {
            file: PathBuf::from(file),
            source_id: source_id.to_string(),
            count: parse_count(rest.first())?,
        },
        ["export", file, source_id, rest @ ..] if rest.len() <= 1 => Command::Export {
            file: PathBuf::from(file),
            source_id: source_id.to_string(),
            count: parse_count(rest.first())?,
        },
        ["list", file] => Command::List {
            file: PathBuf::from(file),
        },
        other => return Err(anyhow::anyhow!("Unrecognized arguments: {}", other.join(" "))),
    };

    Ok(CliArgs {
        command,
        root,
        verbose,
    })
}

pub fn print_help(binary_name: &str) {
    println!(
        "Pubcal v{} - Submission deadlines from publication calendars",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} next <file.ics> <source-id> [count]", binary_name);
    println!("    {} list <file.ics>", binary_name);
    println!("    {} export <file.ics> <source-id> [count]", binary_name);
    println!("    {} --help", binary_name);
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and cache.");
    println!("    -v, --verbose         Debug logging on stderr.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("COMMANDS:");
    println!("    next      Upcoming run dates and submission deadlines for one source");
    println!("    list      Every resolved event in the calendar, plus parse diagnostics");
    println!("    export    Submission windows for one source as an .ics document");
    println!();
    println!("The source id is the part of an event UID before the first '_'.");
}
