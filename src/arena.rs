// ===============================
// src/arena.rs
// ===============================
//
// Single-match view. On activation it resolves the two fighters once, then
// polls the match on a RepeatingTask:
//
//   tick: GET game -> Completed? stop timer : PUT advance ply -> GET cells -> merge board
//
// Any failure inside a tick is logged and the tick is a no-op; the next tick
// retries. Ticks may overlap; the shared stop token is checked before the
// advance call and before anything is published, so nothing is advanced
// after Completed was seen and nothing is written after teardown.
//
// Each tick also takes a sequence number when it starts. An answer is only
// published if no later tick has published yet, so a slow tick can never
// roll the game or the board back.
//
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures_util::future::try_join;
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::domain::{Board, CellDetail, Event, Fighter, Game, GameId, Play};
use crate::fetcher::{Fetcher, NetworkError};
use crate::maybe::{just, maybe_of, nothing, Maybe};
use crate::metrics::{GAME_TICKS, PLY_ADVANCES, STALE_RESPONSES};
use crate::recorder::RecordTx;
use crate::schedule::RepeatingTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchup {
    pub player_one: Maybe<Fighter>,
    pub player_two: Maybe<Fighter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    Completed,
    TornDown,
    /// A later tick already published.
    Stale,
}

/// What the display side reads.
struct Shared {
    game: watch::Sender<Maybe<Game>>,
    board: watch::Sender<Board>,
    issued: AtomicU64,
    applied: AtomicU64,
}

impl Shared {
    fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark `seq` as applied unless a later tick got there first.
    fn claim(&self, seq: u64) -> bool {
        self.applied.fetch_max(seq, Ordering::SeqCst) <= seq
    }

    fn publish_game(&self, seq: u64, game: Game) -> bool {
        self.game.send_if_modified(|g| {
            if !self.claim(seq) {
                return false;
            }
            *g = just(game);
            true
        })
    }

    fn merge_cells(&self, seq: u64, cells: &[CellDetail], game_id: &str) -> bool {
        self.board.send_if_modified(|b| {
            if !self.claim(seq) {
                return false;
            }
            let skipped = b.merge(cells);
            if skipped > 0 {
                warn!(game = %game_id, skipped, "cells outside the board ignored");
            }
            true
        })
    }
}

pub struct Arena<F> {
    api: Api<F>,
    game_id: GameId,
    period: Duration,
    matchup: Maybe<Matchup>,
    shared: Arc<Shared>,
    timer: Maybe<RepeatingTask>,
    rec: RecordTx,
}

impl<F: Fetcher> Arena<F> {
    pub fn new(api: Api<F>, game_id: GameId, period: Duration, rec: RecordTx) -> Self {
        let (game, _) = watch::channel(nothing());
        let (board, _) = watch::channel(Board::default());
        Self {
            api,
            game_id,
            period,
            matchup: nothing(),
            shared: Arc::new(Shared { game, board, issued: AtomicU64::new(0), applied: AtomicU64::new(0) }),
            timer: nothing(),
            rec,
        }
    }

    pub fn matchup(&self) -> Maybe<&Matchup> {
        self.matchup.as_ref()
    }

    pub fn subscribe_game(&self) -> watch::Receiver<Maybe<Game>> {
        self.shared.game.subscribe()
    }

    pub fn subscribe_board(&self) -> watch::Receiver<Board> {
        self.shared.board.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        match &self.timer {
            Maybe::Just(t) => !t.is_stopped(),
            Maybe::Nothing => false,
        }
    }

    /// Resolve the fighters and start polling. Once the fighters are
    /// resolved this is a no-op: neither refetched nor restarted.
    pub async fn activate(&mut self) -> Result<(), NetworkError> {
        if self.matchup.is_just() {
            return Ok(());
        }

        info!(game = %self.game_id, "retrieving fighters");
        let (plays, fighters) = try_join(self.api.plays(&self.game_id), self.api.fighters()).await?;
        let matchup = resolve_matchup(&plays, fighters);
        if let Maybe::Nothing = matchup.player_one {
            warn!(game = %self.game_id, "first fighter id doesn't exist");
        }
        if let Maybe::Nothing = matchup.player_two {
            warn!(game = %self.game_id, "second fighter id doesn't exist");
        }
        self.matchup = just(matchup);

        let api = self.api.clone();
        let game_id = self.game_id.clone();
        let shared = self.shared.clone();
        let rec = self.rec.clone();
        self.timer = just(RepeatingTask::spawn("game-poll", self.period, move |stop| {
            let api = api.clone();
            let game_id = game_id.clone();
            let shared = shared.clone();
            let rec = rec.clone();
            async move {
                match tick(&api, &game_id, &shared, &rec, &stop).await {
                    Ok(outcome) => {
                        GAME_TICKS.with_label_values(&[outcome_label(outcome)]).inc();
                        debug!(game = %game_id, ?outcome, "tick");
                    }
                    Err(e) => {
                        GAME_TICKS.with_label_values(&["error"]).inc();
                        warn!(game = %game_id, %e, "tick failed");
                    }
                }
            }
        }));
        Ok(())
    }

    /// Stop polling. Safe to call at any time, including mid-tick.
    pub fn deactivate(&mut self) {
        if let Maybe::Just(t) = std::mem::take(&mut self.timer) {
            t.stop();
            info!(game = %self.game_id, "polling stopped");
        }
    }
}

fn outcome_label(o: TickOutcome) -> &'static str {
    match o {
        TickOutcome::Advanced => "advanced",
        TickOutcome::Completed => "completed",
        TickOutcome::TornDown => "torn_down",
        TickOutcome::Stale => "stale",
    }
}

/// Player one/two by the `player_one` flag, falling back to response order.
fn resolve_matchup(plays: &[Play], fighters: Vec<Fighter>) -> Matchup {
    let by_id: HashMap<String, Fighter> = fighters.into_iter().map(|f| (f.id.clone(), f)).collect();
    let first = plays.iter().find(|p| p.player_one).or_else(|| plays.first());
    let second = plays
        .iter()
        .find(|p| !p.player_one)
        .or_else(|| plays.get(1));
    let lookup = |p: Option<&Play>| maybe_of(p.and_then(|p| by_id.get(&p.fighter).cloned()));
    Matchup { player_one: lookup(first), player_two: lookup(second) }
}

async fn tick<F: Fetcher>(
    api: &Api<F>,
    game_id: &str,
    shared: &Shared,
    rec: &RecordTx,
    stop: &CancellationToken,
) -> Result<TickOutcome, NetworkError> {
    let seq = shared.next_seq();
    let game = api.game(game_id).await?;
    if stop.is_cancelled() {
        return Ok(TickOutcome::TornDown);
    }
    let completed = game.state.is_completed();
    if completed {
        // terminal whatever the ordering
        stop.cancel();
    }
    if !shared.publish_game(seq, game.clone()) {
        return Ok(stale_tick(game_id, seq));
    }
    rec.record(Event::Game(game));

    if completed {
        info!(game = %game_id, "game completed");
        return Ok(TickOutcome::Completed);
    }

    api.advance_game(game_id).await?;
    PLY_ADVANCES.inc();

    let cells = api.game_cells(game_id).await?;
    if stop.is_cancelled() {
        return Ok(TickOutcome::TornDown);
    }
    if !shared.merge_cells(seq, &cells, game_id) {
        return Ok(stale_tick(game_id, seq));
    }
    let board = *shared.board.borrow();
    rec.record(Event::Board { game_id: game_id.to_string(), board });
    Ok(TickOutcome::Advanced)
}

fn stale_tick(game_id: &str, seq: u64) -> TickOutcome {
    STALE_RESPONSES.with_label_values(&["tick"]).inc();
    debug!(game = %game_id, seq, "answer of an older tick dropped");
    TickOutcome::Stale
}
