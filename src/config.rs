// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : fighter_pools - async terminal client for tic-tac-toe fighter pools
Module  : config.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Command line surface plus the environment-driven knobs (.env is
          read first, then clap picks up flags and their env fallbacks).
=============================================================================
*/
use std::env;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "fighter_pools", version, about = "Watch and drive tic-tac-toe fighter pools")]
pub struct Cli {
    /// Backend base URL
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,

    /// Prometheus port (0 = off)
    #[arg(long, env = "METRICS_PORT", default_value_t = 9898)]
    pub metrics_port: u16,

    /// Append every observed event to this JSONL file
    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<String>,

    /// Where the session token is kept between runs
    #[arg(long, env = "SESSION_FILE", default_value = ".fighter_pools_session")]
    pub session_file: String,

    /// tracing EnvFilter directive
    #[arg(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// Exchange a Google ID token for a session
    Login {
        #[arg(long, env = "GOOGLE_JWT")]
        google_jwt: String,
    },
    /// Forget the stored session
    Logout,
    /// Pools view; reads commands from stdin
    Pools,
    /// Watch one match until it completes
    Arena { game_id: String },
    /// Start a match between two fighters and watch it
    Match { first: String, second: String },
    /// List all fighters
    Fighters,
    /// Show one fighter's record
    Fighter { id: String },
}

/// Timer knobs, in milliseconds in the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    pub game_poll: Duration,
    pub round_delay: Duration,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            game_poll: Duration::from_millis(1000),
            round_delay: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(10),
            http_timeout: Duration::from_millis(5000),
        }
    }
}

fn millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl Timings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            game_poll: millis("GAME_POLL_MS", d.game_poll),
            round_delay: millis("ROUND_DELAY_MS", d.round_delay),
            retry_delay: millis("RETRY_DELAY_MS", d.retry_delay),
            http_timeout: millis("HTTP_TIMEOUT_MS", d.http_timeout),
        }
    }
}

pub fn load() -> (Cli, Timings) {
    // .env first so clap's env fallbacks see it
    let _ = dotenv();
    let cli = Cli::parse();
    (cli, Timings::from_env())
}
