//! Main entry point for the thermo-sensor daemon.
//!
//! The configuration file is taken from the first argument, or from
//! `THERMO_CONFIG` when no argument is given.

use std::env;

use anyhow::Context;
use thermo_sensor::{config::Config, daemon::Daemon, tracing, tracing::prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = match env::args_os().nth(1).or_else(|| env::var_os("THERMO_CONFIG")) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => {
            warn!("No configuration given; running with no sensors");
            Config::default()
        }
    };

    let daemon = Daemon::new(config);
    daemon.run().await
}
