//! logsift - index, filter, and cluster large log files from the command line.
//!
//! Progress goes to the log (`RUST_LOG=info`); results go to stdout as
//! tab-separated columns.

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::StreamExt;
use logsift::index::{format_minute_key, parse_timestamp_prefix};
use logsift::rows::{level_counts, read_row, timeline_bins};
use logsift::{
    ClusterOptions, Config, FilterPredicate, Level, Outcome, Session, TaskEvent, TaskHandle,
    TextQuery,
};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; progress reports are logged at info level
    env_logger::init();

    let matches = build_cli().get_matches();
    let file_path = PathBuf::from(
        matches
            .get_one::<String>("file")
            .context("file argument is required")?,
    );
    let predicate = predicate_from_matches(&matches)?;
    let config = load_config(&matches)?;
    let max_clusters = matches
        .get_one::<usize>("top")
        .copied()
        .unwrap_or(config.cluster.default_max_clusters);

    let mut session = Session::new(config);
    session
        .open(&file_path)
        .with_context(|| format!("Cannot open {}", file_path.display()))?;

    let handle = session.start_index()?;
    let id = handle.id();
    let outcome = drive(handle).await?;
    if !session.publish_index(id, outcome) {
        bail!("indexing was cancelled");
    }

    if !predicate.is_pass_through() {
        let handle = session.start_filter(predicate)?;
        let id = handle.id();
        let outcome = drive(handle).await?;
        if !session.publish_view(id, outcome) {
            bail!("filtering was cancelled");
        }
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if matches.get_flag("cluster") {
        let options = ClusterOptions {
            errors_only: matches.get_flag("errors-only"),
            max_clusters,
        };
        let handle = session.start_cluster(options)?;
        let id = handle.id();
        let outcome = drive(handle).await?;
        if !session.publish_clusters(id, outcome) {
            bail!("clustering was cancelled");
        }
        for entry in session.clusters().iter() {
            writeln!(out, "{}\t{}\t{}", entry.count, entry.template_key, entry.sample_line)?;
        }
    } else if matches.get_flag("timeline") {
        if let Some(index) = session.index() {
            for bin in timeline_bins(index, session.view()) {
                writeln!(out, "{}\t{}", format_minute_key(bin.minute_key), bin.count)?;
            }
        }
    } else if matches.get_flag("stats") {
        if let Some(index) = session.index() {
            for (level, count) in level_counts(index, session.view()) {
                writeln!(out, "{}\t{}", level.map_or("UNKNOWN", Level::as_str), count)?;
            }
        }
    } else if let (Some(index), Some(file)) = (session.index(), session.file()) {
        let limit = matches.get_one::<usize>("limit").copied().unwrap_or(usize::MAX);
        let row_config = &session.config().rows;
        for &row in session.view().iter().take(limit) {
            let fields = read_row(index, file, row, row_config);
            writeln!(out, "{}\t{}\t{}", fields.timestamp, fields.level, fields.message)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn build_cli() -> Command {
    let command = Command::new("logsift")
        .version(logsift::VERSION)
        .about("Index, filter, and cluster large log files")
        .long_about(
            "logsift indexes a .log file in one streaming pass, then filters it by level, \
             minute, and text, or groups its lines into message templates.",
        )
        .arg(
            Arg::new("file")
                .help("Path to the .log file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("level")
                .long("level")
                .value_name("LIST")
                .help("Comma-separated levels to keep (e.g. ERROR,WARN)"),
        )
        .arg(
            Arg::new("minute")
                .long("minute")
                .value_name("MINUTE")
                .help("Keep one minute: 'YYYY-MM-DD HH:MM' or YYYYMMDDHHMM"),
        )
        .arg(
            Arg::new("grep")
                .long("grep")
                .short('g')
                .value_name("PATTERN")
                .help("Keep lines matching this regular expression"),
        )
        .arg(
            Arg::new("literal")
                .long("literal")
                .short('F')
                .action(ArgAction::SetTrue)
                .help("Treat the pattern as plain text"),
        )
        .arg(
            Arg::new("ignore-case")
                .long("ignore-case")
                .short('i')
                .action(ArgAction::SetTrue)
                .help("Match the pattern case-insensitively"),
        )
        .arg(
            Arg::new("cluster")
                .long("cluster")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["timeline", "stats"])
                .help("Print message templates instead of rows"),
        )
        .arg(
            Arg::new("errors-only")
                .long("errors-only")
                .action(ArgAction::SetTrue)
                .requires("cluster")
                .help("Only cluster lines that look like errors"),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of clusters to print"),
        )
        .arg(
            Arg::new("timeline")
                .long("timeline")
                .action(ArgAction::SetTrue)
                .conflicts_with("stats")
                .help("Print per-minute line counts"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("Print per-level line counts"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .short('n')
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Print at most N rows"),
        );

    #[cfg(feature = "config")]
    let command = command.arg(
        Arg::new("config")
            .long("config")
            .value_name("PATH")
            .help("Configuration file (defaults to the user config directory)"),
    );

    command
}

#[cfg(feature = "config")]
fn load_config(matches: &ArgMatches) -> Result<Config> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(std::path::Path::new(path))?,
        None => Config::load_or_default()?,
    };
    Ok(config)
}

#[cfg(not(feature = "config"))]
fn load_config(_matches: &ArgMatches) -> Result<Config> {
    Ok(Config::default())
}

fn predicate_from_matches(matches: &ArgMatches) -> Result<FilterPredicate> {
    let mut predicate = FilterPredicate::new();

    if let Some(list) = matches.get_one::<String>("level") {
        let levels = list
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .map(str::parse::<Level>)
            .collect::<logsift::Result<Vec<_>>>()?;
        predicate = predicate.with_levels(levels);
    }

    if let Some(minute) = matches.get_one::<String>("minute") {
        predicate = predicate.with_minute_bucket(parse_minute(minute)?);
    }

    if let Some(pattern) = matches.get_one::<String>("grep") {
        let mut query = if matches.get_flag("literal") {
            TextQuery::literal(pattern.as_str())
        } else {
            TextQuery::regex(pattern.as_str())
        };
        if matches.get_flag("ignore-case") {
            query = query.ignore_case();
        }
        predicate = predicate.with_text(query);
    }

    Ok(predicate)
}

/// Minute key from `YYYYMMDDHHMM` or `YYYY-MM-DD HH:MM`
fn parse_minute(text: &str) -> Result<u64> {
    let text = text.trim();
    if text.len() == 12 && text.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(text.parse()?);
    }
    parse_timestamp_prefix(&format!("{}:00", text))
        .map(|keys| keys.minute_key)
        .with_context(|| format!("invalid minute '{}', expected 'YYYY-MM-DD HH:MM'", text))
}

/// Wait for a task, logging its progress; Ctrl-C cancels it
async fn drive<T>(handle: TaskHandle<T>) -> Result<Outcome<T>> {
    let kind = handle.kind();
    let cancel = handle.cancel_token();
    let mut events = handle.into_stream();
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(TaskEvent::Progress(progress)) => log::info!("{}: {}", kind, progress.message),
                Some(TaskEvent::Finished(value)) => return Ok(Outcome::Completed(value)),
                Some(TaskEvent::Cancelled(value)) => return Ok(Outcome::Cancelled(value)),
                Some(TaskEvent::Failed(error)) => return Err(error.into()),
                None => bail!("{} task ended without a result", kind),
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                log::warn!("interrupted, cancelling {}", kind);
                cancel.cancel();
                interrupted = true;
            }
        }
    }
}
