//! Trace-propagating HTTP relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                      RELAY                           │
//!   Client Request   │  ┌────────┐   ┌──────────┐   ┌───────────┐           │
//!   ─────────────────┼─▶│  http  │──▶│ sanitize │──▶│ propagate │           │
//!                    │  │ server │   └──────────┘   └─────┬─────┘           │
//!                    │  └───┬────┘                        ▼                 │
//!                    │      │ /enqueue             ┌───────────┐           │
//!   Client Response  │      ▼                      │  forward  │───────────┼──▶ Downstream
//!   ◀────────────────┼─ ┌────────┐   ┌────────┐    └───────────┘           │
//!                    │  │ queue  │──▶│ worker │──▶ sanitize/propagate/     │
//!                    │  └────────┘   └────────┘    forward to /api/end     │
//!                    │                                                      │
//!                    │  config · observability · lifecycle                 │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trace_relay::config::load_config;
use trace_relay::lifecycle::startup;

#[derive(Parser)]
#[command(name = "trace-relay")]
#[command(about = "HTTP relay that propagates and repairs trace context", long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Telemetry is not up yet, so configuration errors go to stderr.
    let config = match load_config(cli.config.as_deref(), cli.bind.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("trace-relay: configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay terminated");
            eprintln!("trace-relay: {}", e);
            ExitCode::FAILURE
        }
    }
}
