/*
 * This file is part of backlight-sync.
 *
 * Copyright (C) 2025 backlight-sync contributors
 *
 * backlight-sync is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * backlight-sync is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with backlight-sync. If not, see <https://www.gnu.org/licenses/>.
 */

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

use backlight_sync::calibration::CurveProfile;
use backlight_sync::config::{SyncConfig, DEFAULT_SLEEP_TIME_S};
use backlight_sync::logger;

#[derive(Parser, Debug)]
#[command(name = "backlight-sync")]
#[command(version)]
#[command(about = "Sync external monitor brightness with the built-in panel")]
#[command(long_about = "Sync external monitor brightness with the built-in panel

Polls /sys/class/backlight/intel_backlight and writes a calibrated value to
every other backlight device (ddcci) whenever the panel brightness changes.
Reloads the ddcci_backlight module when a monitor stops accepting writes.

ENVIRONMENT VARIABLES:
    BACKLIGHT_SYNC_LOG=debug   Log filter (tracing EnvFilter syntax)")]
struct Cli {
    /// Time between two brightness updates, in seconds
    #[arg(short = 's', long = "sleep-time", default_value_t = DEFAULT_SLEEP_TIME_S)]
    sleep_time: f64,

    /// Print a status line on every brightness change
    #[arg(long = "no-quiet")]
    no_quiet: bool,

    /// Calibration curve mapping panel brightness onto external devices
    #[arg(long, value_enum, default_value_t = CurveProfile::Relative)]
    curve: CurveProfile,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Append JSON event lines to this file
    #[arg(long, value_name = "PATH")]
    event_log: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let log_level = std::env::var("BACKLIGHT_SYNC_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SyncConfig {
        sleep_time_s: cli.sleep_time,
        quiet: !cli.no_quiet,
        curve: cli.curve,
        ..SyncConfig::default()
    };

    if let Some(path) = &cli.event_log {
        if let Err(e) = logger::init_event_log(path) {
            warn!("Could not open event log {}: {}", path.display(), e);
        }
    }
    logger::log_event("startup", json!({ "config": &config }));

    if let Err(e) = ctrlc::set_handler(|| {
        info!("Received SIGINT/SIGTERM, exiting");
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let engine = config.build_engine().context("invalid configuration")?;

    info!(
        "backlight-sync {} starting: curve {}, interval {:?}",
        env!("CARGO_PKG_VERSION"),
        config.curve,
        config.interval()
    );

    // sync() only comes back on a fatal error
    match engine.sync() {
        Ok(never) => match never {},
        Err(err) => {
            error!("{}", err);
            logger::log_event("fatal_error", json!({ "error": err.to_string() }));
            Err(anyhow::Error::new(err).context("synchronization stopped"))
        }
    }
}
