// ===============================
// src/main.rs
// ===============================
/*
 # log in once (token is kept in SESSION_FILE)
 GOOGLE_JWT=... cargo run -- login

 # pools view; type `play`, `auto`, `pause`, `select 1`, `new`, `create 8`, `quit`
 cargo run -- pools

 # what the client is doing
 curl -s localhost:9898/metrics | egrep '^(pool_rounds_total|game_ticks_total|stale_responses_total)'
*/
/*
=============================================================================
Project : fighter_pools - async terminal client for tic-tac-toe fighter pools
Module  : main.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Logs in against the fighters backend, watches pools and their
          boards, drives rounds manually or on autoplay, follows a single
          match ply by ply, exposes Prometheus metrics, and records JSONL
          events.
=============================================================================
*/
mod api;
mod arena;
mod autoplay;
mod collector;
mod config;
mod domain;
mod fetcher;
mod maybe;
mod metrics;
mod pools;
mod recorder;
mod schedule;
mod session;

use std::process::ExitCode;

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select, signal,
    sync::mpsc,
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::Api;
use crate::arena::Arena;
use crate::autoplay::AutoPlay;
use crate::config::{Cli, Cmd, Timings};
use crate::domain::{Event, GameId};
use crate::fetcher::{Fetcher, HttpFetcher, NetworkError};
use crate::maybe::{Maybe, MaybeLoad};
use crate::pools::{Command, PoolsView};
use crate::recorder::RecordTx;
use crate::session::{Session, SessionError, SessionStore};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("not logged in (run `login` first)")]
    NotLoggedIn,
    #[error("login rejected")]
    LoginRejected,
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Load config ----
    let (cli, timings) = config::load();

    // ---- Logging ----
    let filter = EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(cli.metrics_port));
    metrics::CONFIG_BACKEND.with_label_values(&[&cli.backend_url]).set(1);

    info!(
        backend = %cli.backend_url,
        command = ?cli.command,
        game_poll_ms = timings.game_poll.as_millis() as u64,
        round_delay_ms = timings.round_delay.as_millis() as u64,
        retry_delay_ms = timings.retry_delay.as_millis() as u64,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let rec = match cli.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(8192);
            tokio::spawn(recorder::run(rx, path));
            RecordTx::new(tx)
        }
        None => RecordTx::default(),
    };

    // ---- Session + backend ----
    let store = SessionStore::new();
    if let Some(token) = session::load_token_file(&cli.session_file).await {
        store.set(Session::from_token(token));
    }
    let fetcher = match HttpFetcher::new(&cli.backend_url, timings.http_timeout, store.clone()) {
        Ok(f) => f,
        Err(e) => {
            error!(%e, "backend client setup failed");
            return ExitCode::FAILURE;
        }
    };
    let api = Api::new(fetcher);

    let res = run(cli, timings, api, store, rec.clone()).await;
    rec.record(Event::Note("client exit".into()));
    // let the recorder drain
    drop(rec);
    tokio::time::sleep(Duration::from_millis(50)).await;

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run<F: Fetcher>(
    cli: Cli,
    timings: Timings,
    api: Api<F>,
    store: SessionStore,
    rec: RecordTx,
) -> Result<(), AppError> {
    match cli.command {
        Cmd::Login { google_jwt } => match session::login(&api, &store, &google_jwt).await {
            MaybeLoad::Loaded(token) => {
                session::save_token_file(&cli.session_file, &token).await?;
                info!(file = %cli.session_file, "session saved");
                Ok(())
            }
            _ => Err(AppError::LoginRejected),
        },
        Cmd::Logout => {
            store.clear();
            session::remove_token_file(&cli.session_file).await?;
            info!("logged out");
            Ok(())
        }
        Cmd::Pools => {
            require_user(&api, &store, &cli.session_file).await?;
            pools_loop(api, timings, rec).await;
            Ok(())
        }
        Cmd::Arena { game_id } => {
            require_user(&api, &store, &cli.session_file).await?;
            watch_game(api, game_id, timings.game_poll, rec).await
        }
        Cmd::Match { first, second } => {
            require_user(&api, &store, &cli.session_file).await?;
            let game = api.new_game(&first, &second).await?;
            info!(game = %game.id, %first, %second, "match started");
            watch_game(api, game.id, timings.game_poll, rec).await
        }
        Cmd::Fighter { id } => {
            require_user(&api, &store, &cli.session_file).await?;
            let f = api.fighter(&id).await?;
            info!(id = %f.id, name = %f.name, wins = f.wins, losses = f.losses, draws = f.draws, "fighter");
            Ok(())
        }
        Cmd::Fighters => {
            require_user(&api, &store, &cli.session_file).await?;
            let mut fighters = api.fighters().await?;
            fighters.sort_by(|a, b| a.name.cmp(&b.name));
            for f in &fighters {
                info!(id = %f.id, name = %f.name, wins = f.wins, losses = f.losses, draws = f.draws, "fighter");
            }
            Ok(())
        }
    }
}

/// Views need a logged-in user; a failed validation forgets the token,
/// on disk too.
async fn require_user<F: Fetcher>(api: &Api<F>, store: &SessionStore, session_file: &str) -> Result<(), AppError> {
    match session::validate(api, store).await {
        MaybeLoad::Loaded(_) => Ok(()),
        _ => {
            session::remove_token_file(session_file).await?;
            Err(AppError::NotLoggedIn)
        }
    }
}

async fn pools_loop<F: Fetcher>(api: Api<F>, timings: Timings, rec: RecordTx) {
    let autoplay = AutoPlay::new(timings.round_delay, timings.retry_delay);
    let (view, handle) = PoolsView::new(api, autoplay, rec);
    let view_task = tokio::spawn(view.run());
    info!("commands: play | auto | pause | select <n> | new | create <n> | refresh | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        select! {
            line = lines.next_line() => match line {
                Ok(Some(l)) if l.trim().is_empty() => continue,
                Ok(Some(l)) => match l.parse::<Command>() {
                    Ok(Command::Shutdown) => break,
                    Ok(cmd) => {
                        if !handle.send(cmd).await {
                            break;
                        }
                    }
                    Err(e) => warn!(%e, "bad command"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(?e, "stdin read failed");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    let _ = handle.send(Command::Shutdown).await;
    if let Err(e) = view_task.await {
        error!(?e, "pools view task failed");
    }
}

/// Poll one game until it completes or the user interrupts.
async fn watch_game<F: Fetcher>(
    api: Api<F>,
    game_id: GameId,
    period: Duration,
    rec: RecordTx,
) -> Result<(), AppError> {
    let mut arena = Arena::new(api, game_id, period, rec);
    arena.activate().await?;
    if let Maybe::Just(m) = arena.matchup() {
        let name = |f: &Maybe<domain::Fighter>| match f {
            Maybe::Just(f) => f.name.clone(),
            Maybe::Nothing => "?".to_string(),
        };
        info!(x = %name(&m.player_one), o = %name(&m.player_two), "arena");
    }

    let mut game_rx = arena.subscribe_game();
    let mut board_rx = arena.subscribe_board();
    loop {
        select! {
            changed = game_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let completed = match &*game_rx.borrow_and_update() {
                    Maybe::Just(g) => {
                        info!(game = %g.id, state = g.state.describe(), "game");
                        g.state.is_completed()
                    }
                    Maybe::Nothing => false,
                };
                if completed {
                    let board = *board_rx.borrow();
                    info!(%board, "game over");
                    break;
                }
            }
            changed = board_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let board = *board_rx.borrow_and_update();
                info!(%board, "board");
            }
            _ = signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    arena.deactivate();
    Ok(())
}
