use clap::{Args, Parser, Subcommand};
use sabun::config::{SettingsFile, load_settings};
use sabun::{
    LineStatusTracker, LineText, LockResultExt, Range, RangeKind, TextDocument, TrackerSettings,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Line status of a working file against a base revision
#[derive(Parser)]
#[command(name = "sabun")]
#[command(version)]
#[command(about = "Show and revert the line ranges by which a file differs from its base revision")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the changed line ranges of the working file
    Ranges {
        #[command(flatten)]
        files: FileArgs,

        /// Print the ranges as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the working file with the ranges touching the given lines reverted
    Rollback {
        #[command(flatten)]
        files: FileArgs,

        /// Zero-based working line whose range should be reverted (repeatable)
        #[arg(long = "line", required = true)]
        lines: Vec<usize>,
    },
}

#[derive(Args)]
struct FileArgs {
    /// The base revision
    #[arg(long)]
    base: PathBuf,

    /// The working copy
    #[arg(long)]
    working: PathBuf,

    /// Do not flag modifications that only change whitespace
    #[arg(long)]
    ignore_whitespace: bool,

    /// Largest number of lines handed to the diff engine
    #[arg(long)]
    max_diff_lines: Option<usize>,
}

#[derive(Serialize)]
struct RangeReport {
    #[serde(flatten)]
    range: Range,
    kind: RangeKind,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ranges { files, json } => {
            let tracker = open_tracker(&files);
            let ranges = tracker.ranges();
            if json {
                let report: Vec<RangeReport> = ranges
                    .into_iter()
                    .map(|range| RangeReport {
                        kind: range.kind(),
                        range,
                    })
                    .collect();
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                for range in ranges {
                    println!("{}", describe(&range));
                }
            }
        }
        Commands::Rollback { files, lines } => {
            let tracker = open_tracker(&files);
            let lines: BTreeSet<usize> = lines.into_iter().collect();
            match tracker.rollback_lines(&lines) {
                Ok(count) => {
                    eprintln!("Reverted {} range(s)", count);
                    let buffer = tracker.buffer().read().recover_poison("rollback output");
                    print!("{}", buffer.text());
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn describe(range: &Range) -> String {
    let kind = match range.kind() {
        RangeKind::Inserted => "inserted",
        RangeKind::Deleted => "deleted",
        RangeKind::Modified if range.whitespace_only => "whitespace",
        RangeKind::Modified => "modified",
    };
    format!(
        "{}\t{}..{}\t{}..{}",
        kind, range.line1, range.line2, range.vcs_line1, range.vcs_line2
    )
}

fn open_tracker(files: &FileArgs) -> LineStatusTracker<TextDocument> {
    let settings = resolve_settings(files);
    let base = read_file(&files.base);
    let working = read_file(&files.working);

    let buffer = Arc::new(RwLock::new(TextDocument::new(working)));
    let tracker = LineStatusTracker::new(buffer, settings);
    if let Err(e) = tracker.set_base_revision(base) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    tracker
}

fn resolve_settings(files: &FileArgs) -> TrackerSettings {
    let overrides = SettingsFile {
        detect_whitespace_changes: files.ignore_whitespace.then_some(false),
        max_diff_lines: files.max_diff_lines,
        ..SettingsFile::default()
    };
    let root = std::env::current_dir().ok();
    let outcome = load_settings(root.as_deref(), Some(overrides));
    for event in &outcome.events {
        event.log();
    }
    outcome.settings
}

fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error: Could not read {}: {}", path.display(), e);
        std::process::exit(1);
    })
}
