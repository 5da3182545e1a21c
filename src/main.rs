mod history;
mod live;
mod playback;
mod reconciler;
mod sample;
mod web;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use crate::history::History;
use crate::playback::Track;
use crate::sample::HeadingUnits;
use crate::web::config::PlaybackConfig;
use crate::web::Config;

#[derive(Parser)]
#[command(name = "track-o-mat")]
#[command(about = "Live position tracking and track playback")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/SSE service
    Serve {
        #[arg(long, short)]
        config: String,
    },
    /// Validate a config file
    Validate { config: String },
    /// Step a playback cursor through a history file
    Replay {
        history: String,
        /// Start of playback (RFC3339), defaults to the first sample
        #[arg(long, value_parser = parse_time)]
        from: Option<DateTime<Utc>>,
        /// End of playback (RFC3339), defaults to the last sample
        #[arg(long, value_parser = parse_time)]
        to: Option<DateTime<Utc>>,
        /// Playback clock step
        #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
        step: Duration,
        /// Config file supplying the playback settings
        #[arg(long, short)]
        config: Option<String>,
        /// Smallest clock change that triggers a lookup, overrides the config
        #[arg(long, value_parser = humantime::parse_duration)]
        min_delta: Option<Duration>,
    },
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config),
        Commands::Validate { config } => validate(&config),
        Commands::Replay {
            history,
            from,
            to,
            step,
            config,
            min_delta,
        } => {
            let playback = match config.as_deref().map(Config::from_file).transpose() {
                Ok(config) => config.map(|c| c.playback).unwrap_or_default(),
                Err(e) => {
                    eprintln!("Config error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            replay(&history, from, to, step, &playback, min_delta)
        }
    }
}

fn serve(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(web::run_server(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Config is valid");
    println!("  bind:               {}", config.web.bind);
    println!(
        "  stale timeout:      {}",
        humantime::format_duration(config.live.stale_timeout)
    );
    println!(
        "  sweep interval:     {}",
        humantime::format_duration(config.live.sweep_interval)
    );
    let fields: Vec<&str> = config.live.default_field_order.iter().collect();
    println!("  default fields:     [{}]", fields.join(", "));
    println!(
        "  interpolation gap:  {}",
        humantime::format_duration(config.playback.interpolate_max_gap)
    );
    println!(
        "  history:            {} (autoload {})",
        config.history.folder.display(),
        if config.history.autoload { "on" } else { "off" }
    );
    if config.api_keys.is_empty() {
        println!("  api keys:           none, write endpoints are open");
    }
    for key in &config.api_keys {
        let mut permissions: Vec<String> =
            key.permissions.iter().map(|p| format!("{:?}", p)).collect();
        permissions.sort();
        println!("  api key:            {} [{}]", key.name, permissions.join(", "));
    }
    ExitCode::SUCCESS
}

fn replay(
    path: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    step: Duration,
    playback: &PlaybackConfig,
    min_delta: Option<Duration>,
) -> ExitCode {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let track = match History::from_json(&content) {
        Ok(history) => history.into_track(),
        Err(e) => {
            eprintln!("History error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (Some(first), Some(last)) = (track.get(0), track.last()) else {
        println!("Track is empty");
        return ExitCode::SUCCESS;
    };
    let from = from.unwrap_or(first.timestamp);
    let to = to.unwrap_or(last.timestamp);

    let step = match TimeDelta::from_std(step) {
        Ok(s) if s > TimeDelta::zero() => s,
        _ => {
            eprintln!("Step must be a positive duration");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Replaying {} samples from {} to {}",
        track.len(),
        from.to_rfc3339(),
        to.to_rfc3339()
    );

    let units = playback.heading_units;
    let mut cursor = playback.cursor(min_delta);
    cursor.start(from);
    print_frame(&track, from, units);

    let mut lookups = 1;
    for clock in replay_clock(from, to, step).skip(1) {
        if cursor.update(clock) {
            print_frame(&track, clock, units);
            lookups += 1;
        }
    }

    if let Some(last) = cursor.last_update() {
        println!("{} lookups, cursor stopped at {}", lookups, last.to_rfc3339());
    }
    ExitCode::SUCCESS
}

/// Clock ticks from `from` to `to` inclusive. Stops early if a tick would
/// leave chrono's representable range.
fn replay_clock(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    step: TimeDelta,
) -> impl Iterator<Item = DateTime<Utc>> {
    std::iter::successors(Some(from), move |clock| clock.checked_add_signed(step))
        .take_while(move |clock| *clock <= to)
}

fn print_frame(track: &Track, clock: DateTime<Utc>, units: HeadingUnits) {
    let Some((index, sample)) = track
        .find_nearest_index(clock)
        .and_then(|index| Some((index, track.get(index)?)))
    else {
        println!("  {}  -", clock.to_rfc3339());
        return;
    };
    let heading = sample
        .heading(track.field_order(), units)
        .map(|h| format!(" heading {:.1}", h.to_degrees()))
        .unwrap_or_default();
    println!(
        "  {}  #{} ({:.6}, {:.6}){}",
        clock.to_rfc3339(),
        index,
        sample.lon,
        sample.lat,
        heading
    );
}
