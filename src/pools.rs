// ===============================
// src/pools.rs
// ===============================
//
// Pools view: one task owns the whole store and handles, in order,
//   - user commands (select / new / create / play / autoplay / pause)
//   - answers of the requests it spawned, each tagged with the Generation
//     it was issued under (stale ones are dropped)
//   - autoplay triggers
//
// Nothing is awaited while handling a message, so every state transition is
// atomic with respect to the others.
//
// Data flow:
//   refresh -> pools -> selected pool -> fighters + games
//                                     -> one details fetch per game (Collector)
//                                     -> games_loaded = Loaded
//   round   -> PUT pool -> refresh
//
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::autoplay::{AutoPlay, Step};
use crate::collector::{fan_out, Collector, Outcome};
use crate::domain::{Board, Event, Fighter, Game, GameDetails, GameId, Pool, PoolId};
use crate::fetcher::{Fetcher, NetworkError};
use crate::maybe::{just, nothing, Generation, LoadSlot, Maybe, MaybeLoad};
use crate::metrics::{ROUNDS, STALE_RESPONSES};
use crate::recorder::RecordTx;
use crate::schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Pool(usize),
    NewPool,
}

/// One board of the selected pool, as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGame {
    pub game_id: GameId,
    pub player_one: Fighter,
    pub player_two: Fighter,
    pub board: Board,
}

impl PoolGame {
    pub fn new(game_id: GameId, d: GameDetails) -> Self {
        let board = Board::from_details(&d.cell_details);
        Self { game_id, player_one: d.player_one, player_two: d.player_two, board }
    }

    pub fn sort_key(&self) -> String {
        format!("{} {}", self.player_one.name, self.player_two.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolSizeError {
    #[error("a pool needs at least 2 fighters, got {0}")]
    TooSmall(u32),
    #[error("pool size must be even, got {0}")]
    Odd(u32),
}

pub fn validate_pool_size(n: u32) -> Result<u32, PoolSizeError> {
    if n < 2 {
        return Err(PoolSizeError::TooSmall(n));
    }
    if n % 2 == 1 {
        return Err(PoolSizeError::Odd(n));
    }
    Ok(n)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Select(usize),
    NewPool,
    Create(u32),
    Play,
    AutoPlay,
    Pause,
    Shutdown,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        let number = |what: &str| -> Result<u32, String> {
            arg.ok_or_else(|| format!("{what} needs a number"))?
                .parse::<u32>()
                .map_err(|e| format!("{what}: {e}"))
        };
        match verb.as_str() {
            "refresh" | "r" => Ok(Command::Refresh),
            "select" | "s" => Ok(Command::Select(number("select")? as usize)),
            "new" => Ok(Command::NewPool),
            "create" | "c" => Ok(Command::Create(number("create")?)),
            "play" | "p" => Ok(Command::Play),
            "auto" | "autoplay" | "a" => Ok(Command::AutoPlay),
            "pause" => Ok(Command::Pause),
            "quit" | "exit" | "q" => Ok(Command::Shutdown),
            other => Err(format!("unknown command `{other}`")),
        }
    }
}

enum Msg {
    Pools(Generation, Result<Vec<Pool>, NetworkError>),
    Fighters(Generation, Result<Vec<Fighter>, NetworkError>),
    Games(Generation, Result<Vec<Game>, NetworkError>),
    Board(Generation, Result<PoolGame, NetworkError>),
    Created(Result<Pool, NetworkError>),
    RoundDone(PoolId, Result<(), NetworkError>),
    Trigger(u64),
}

/// What the main area shows, derived from the combined load states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainBlock {
    Blank,
    PoolsError,
    NewPoolForm,
    LoadingFighters,
    FightersNotFound,
    FighterCards(Vec<Fighter>),
    LoadingGames,
    LoadingBoards,
    Boards { games: Vec<PoolGame>, complete: bool },
}

impl fmt::Display for MainBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MainBlock::Blank => Ok(()),
            MainBlock::PoolsError => f.write_str("error finding pools"),
            MainBlock::NewPoolForm => f.write_str("new pool: pick a pool size (`create <n>`)"),
            MainBlock::LoadingFighters => f.write_str("loading fighters"),
            MainBlock::FightersNotFound => f.write_str("unable to find fighters"),
            MainBlock::FighterCards(fighters) => {
                f.write_str("fighters:")?;
                for x in fighters {
                    write!(f, " {} (w{} l{} d{})", x.name, x.wins, x.losses, x.draws)?;
                }
                Ok(())
            }
            MainBlock::LoadingGames => f.write_str("loading games"),
            MainBlock::LoadingBoards => f.write_str("loading gameboards"),
            MainBlock::Boards { games, complete } => {
                for (i, g) in games.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "X: {} [{}] O: {}", g.player_one.name, g.board, g.player_two.name)?;
                }
                if !complete {
                    f.write_str(" (some boards failed to load)")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything the view knows. Local-only fields: selection and autoplay.
#[derive(Debug, Default)]
pub struct PoolsState {
    pub pools: LoadSlot<Vec<Pool>>,
    pub current_pool_index: Maybe<Selection>,
    pub fighters: LoadSlot<Vec<Fighter>>,
    pub games: LoadSlot<Vec<Game>>,
    pub boards: Collector<PoolGame>,
    pub games_loaded: MaybeLoad<()>,
    pub autoplay: AutoPlay,
}

impl PoolsState {
    pub fn selected_pool(&self) -> Option<&Pool> {
        match self.current_pool_index {
            Maybe::Just(Selection::Pool(i)) => self.pools.value().and_then(|p| p.get(i)),
            _ => None,
        }
    }

    pub fn main_block(&self) -> MainBlock {
        match self.pools.state() {
            MaybeLoad::NotFound => MainBlock::PoolsError,
            MaybeLoad::Loaded(_) => match self.selected_pool() {
                Some(_) => self.pool_info_block(),
                None => MainBlock::NewPoolForm,
            },
            _ => MainBlock::Blank,
        }
    }

    fn pool_info_block(&self) -> MainBlock {
        match self.fighters.state() {
            MaybeLoad::NotFound => MainBlock::FightersNotFound,
            MaybeLoad::Loaded(fighters) => match self.games.state() {
                MaybeLoad::NotFound => MainBlock::FighterCards(fighters.clone()),
                MaybeLoad::Loaded(_) => {
                    let sorted = || -> Vec<PoolGame> { self.boards.sorted_by_key(PoolGame::sort_key).into_iter().cloned().collect() };
                    match self.boards.status() {
                        MaybeLoad::Loaded(()) => MainBlock::Boards { games: sorted(), complete: true },
                        MaybeLoad::NotFound => MainBlock::Boards { games: sorted(), complete: false },
                        _ => MainBlock::LoadingBoards,
                    }
                }
                _ => MainBlock::LoadingGames,
            },
            _ => MainBlock::LoadingFighters,
        }
    }
}

#[derive(Clone)]
pub struct PoolsHandle {
    tx: mpsc::Sender<Command>,
}

impl PoolsHandle {
    /// False once the view has shut down.
    pub async fn send(&self, cmd: Command) -> bool {
        self.tx.send(cmd).await.is_ok()
    }
}

pub struct PoolsView<F> {
    api: Api<F>,
    state: PoolsState,
    cmd_rx: mpsc::Receiver<Command>,
    msg_tx: mpsc::Sender<Msg>,
    msg_rx: mpsc::Receiver<Msg>,
    select_after_refresh: Option<PoolId>,
    last_rendered: String,
    rec: RecordTx,
}

impl<F: Fetcher> PoolsView<F> {
    pub fn new(api: Api<F>, autoplay: AutoPlay, rec: RecordTx) -> (Self, PoolsHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (msg_tx, msg_rx) = mpsc::channel(1024);
        let view = Self {
            api,
            state: PoolsState { autoplay, ..PoolsState::default() },
            cmd_rx,
            msg_tx,
            msg_rx,
            select_after_refresh: None,
            last_rendered: String::new(),
            rec,
        };
        (view, PoolsHandle { tx: cmd_tx })
    }

    pub fn state(&self) -> &PoolsState {
        &self.state
    }

    /// Mount, then handle commands and answers until shutdown or until every
    /// handle is dropped. Pending timers and requests die with the channel.
    pub async fn run(mut self) {
        self.refresh();
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(c) => self.on_command(c),
                },
                Some(msg) = self.msg_rx.recv() => self.on_message(msg),
            }
        }
        self.state.autoplay.pause();
        info!("pools view closed");
    }

    fn spawn<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = Msg> + Send + 'static,
    {
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let msg = fut.await;
            let _ = tx.send(msg).await;
        });
    }

    fn on_command(&mut self, cmd: Command) {
        debug!(?cmd, "pools: command");
        match cmd {
            Command::Refresh => self.refresh(),
            Command::Select(i) => self.select(i),
            Command::NewPool => self.new_pool_form(),
            Command::Create(n) => self.create_pool(n),
            Command::Play => self.play_round(),
            Command::AutoPlay => {
                if self.state.autoplay.start() {
                    info!("autoplay started");
                    self.on_trigger(self.state.autoplay.chain());
                }
            }
            Command::Pause => {
                if self.state.autoplay.pause() {
                    info!("autoplay paused");
                }
            }
            Command::Shutdown => {}
        }
        self.render();
    }

    fn on_message(&mut self, msg: Msg) {
        match msg {
            Msg::Pools(g, res) => self.on_pools(g, res),
            Msg::Fighters(g, res) => {
                if let Err(e) = &res {
                    warn!(%e, "pools: fighters fetch failed");
                }
                if !self.state.fighters.resolve(g, res) {
                    stale("fighters", g);
                }
            }
            Msg::Games(g, res) => self.on_games(g, res),
            Msg::Board(g, res) => self.on_board(g, res),
            Msg::Created(res) => match res {
                Ok(pool) => {
                    info!(pool = %pool.id, "new pool created");
                    self.select_after_refresh = Some(pool.id);
                    self.refresh();
                }
                Err(e) => warn!(%e, "pools: create failed"),
            },
            Msg::RoundDone(pool_id, res) => self.on_round_done(pool_id, res),
            Msg::Trigger(chain) => self.on_trigger(chain),
        }
        self.render();
    }

    fn render(&mut self) {
        let now = self.state.main_block().to_string();
        if now != self.last_rendered {
            info!(view = %now, "pools");
            self.last_rendered = now;
        }
    }

    // ---- pool list ----

    fn refresh(&mut self) {
        let g = self.state.pools.begin();
        let api = self.api.clone();
        self.spawn(async move { Msg::Pools(g, api.pools().await) });
    }

    fn on_pools(&mut self, g: Generation, res: Result<Vec<Pool>, NetworkError>) {
        if !self.state.pools.is_current(g) {
            stale("pools", g);
            return;
        }
        match res {
            Ok(pools) => {
                if pools.is_empty() {
                    info!("no pools were loaded");
                }
                let wanted = self
                    .select_after_refresh
                    .take()
                    .and_then(|id| pools.iter().position(|p| p.id == id));
                self.state.current_pool_index = match (wanted, self.state.current_pool_index) {
                    (Some(i), _) => just(Selection::Pool(i)),
                    (None, Maybe::Nothing) if !pools.is_empty() => just(Selection::Pool(0)),
                    (None, Maybe::Just(Selection::Pool(i))) if i >= pools.len() => {
                        if pools.is_empty() { nothing() } else { just(Selection::Pool(0)) }
                    }
                    (None, current) => current,
                };
                self.rec.record(Event::Pools(pools.clone()));
                self.state.pools.resolve::<NetworkError>(g, Ok(pools));
                self.load_pool_info();
            }
            Err(e) => {
                warn!(%e, "pools: fetch failed");
                self.state.current_pool_index = nothing();
                self.state.pools.resolve(g, Err(e));
                self.load_pool_info();
            }
        }
    }

    fn select(&mut self, index: usize) {
        if !self.state.current_pool_index.is_just() {
            debug!("pools: nothing selected yet, selection ignored");
            return;
        }
        if self.state.games_loaded.is_waiting() {
            info!("round in flight, selection ignored");
            return;
        }
        let len = self.state.pools.value().map(Vec::len).unwrap_or(0);
        if index >= len {
            warn!(index, len, "pools: no such pool");
            return;
        }
        self.state.current_pool_index = just(Selection::Pool(index));
        self.load_pool_info();
    }

    fn new_pool_form(&mut self) {
        if !self.state.current_pool_index.is_just() {
            return;
        }
        self.state.current_pool_index = just(Selection::NewPool);
        self.load_pool_info();
    }

    fn create_pool(&mut self, fighter_number: u32) {
        let n = match validate_pool_size(fighter_number) {
            Ok(n) => n,
            Err(e) => {
                warn!(%e, "pools: invalid pool size");
                return;
            }
        };
        let api = self.api.clone();
        self.spawn(async move { Msg::Created(api.create_pool(n).await) });
    }

    // ---- selected pool ----

    /// (Re)load fighters and games for whatever is selected right now.
    fn load_pool_info(&mut self) {
        self.state.boards.abandon();
        let Some(pool_id) = self.state.selected_pool().map(|p| p.id.clone()) else {
            self.state.fighters.reset();
            self.state.games.reset();
            // no pool, so no round can be pending for it
            self.state.games_loaded = MaybeLoad::Uninitialised;
            return;
        };
        if !self.state.games_loaded.is_waiting() {
            self.state.games_loaded = MaybeLoad::Uninitialised;
        }

        let fg = self.state.fighters.begin();
        let api = self.api.clone();
        let id = pool_id.clone();
        self.spawn(async move { Msg::Fighters(fg, api.pool_fighters(&id).await) });

        let gg = self.state.games.begin();
        let api = self.api.clone();
        self.spawn(async move { Msg::Games(gg, api.pool_games(&pool_id).await) });
    }

    fn on_games(&mut self, g: Generation, res: Result<Vec<Game>, NetworkError>) {
        if !self.state.games.is_current(g) {
            stale("games", g);
            return;
        }
        match res {
            Ok(games) => {
                let bg = self.state.boards.begin(games.len());
                let api = self.api.clone();
                fan_out(
                    bg,
                    games.clone(),
                    move |game: Game| {
                        let api = api.clone();
                        async move {
                            let d = api.game_details(&game.id).await?;
                            Ok::<_, NetworkError>(PoolGame::new(game.id, d))
                        }
                    },
                    self.msg_tx.clone(),
                    Msg::Board,
                );
                self.state.games.resolve::<NetworkError>(g, Ok(games));
                if self.state.boards.is_loaded() {
                    self.on_games_loaded();
                }
            }
            Err(e) => {
                warn!(%e, "pools: games fetch failed");
                self.state.games.resolve(g, Err(e));
                self.state.boards.abandon();
                self.state.games_loaded = MaybeLoad::NotFound;
            }
        }
    }

    fn on_board(&mut self, g: Generation, res: Result<PoolGame, NetworkError>) {
        let outcome = match res {
            Ok(pg) => {
                let ev = Event::Board { game_id: pg.game_id.clone(), board: pg.board };
                let outcome = self.state.boards.accept(g, pg);
                if outcome != Outcome::Stale {
                    self.rec.record(ev);
                }
                outcome
            }
            Err(e) => {
                warn!(%e, "pools: game details fetch failed");
                self.state.boards.reject(g)
            }
        };
        match outcome {
            Outcome::Loaded => self.on_games_loaded(),
            Outcome::Failed => {
                warn!(loaded = self.state.boards.received(), "pools: some gameboards failed to load");
                self.state.games_loaded = MaybeLoad::NotFound;
            }
            Outcome::Pending | Outcome::Stale => {}
        }
    }

    fn on_games_loaded(&mut self) {
        debug!(boards = self.state.boards.received(), "pools: games loaded");
        self.state.games_loaded = MaybeLoad::loaded(());
    }

    // ---- rounds & autoplay ----

    fn play_round(&mut self) {
        if !self.state.games_loaded.is_loaded() {
            debug!(games_loaded = self.state.games_loaded.label(), "round skipped");
            ROUNDS.with_label_values(&["skipped"]).inc();
            return;
        }
        let Some(pool_id) = self.state.selected_pool().map(|p| p.id.clone()) else {
            debug!("round skipped: no pool selected");
            return;
        };
        let api = self.api.clone();
        self.spawn(async move {
            let res = api.advance_pool(&pool_id).await;
            Msg::RoundDone(pool_id, res)
        });
        self.state.games_loaded = MaybeLoad::waiting();
    }

    fn on_round_done(&mut self, pool_id: PoolId, res: Result<(), NetworkError>) {
        let ok = res.is_ok();
        match res {
            Ok(()) => {
                ROUNDS.with_label_values(&["ok"]).inc();
                info!(pool = %pool_id, "round played");
            }
            Err(e) => {
                ROUNDS.with_label_values(&["error"]).inc();
                warn!(%e, pool = %pool_id, "round failed");
            }
        }
        self.rec.record(Event::Round { pool_id: pool_id.clone(), ok });

        // the selection may have moved while the round was in flight
        let still_selected = self.state.selected_pool().map(|p| p.id == pool_id).unwrap_or(false);
        if !still_selected {
            info!(pool = %pool_id, "round finished for a pool that is no longer selected");
        }
        self.refresh();
    }

    fn on_trigger(&mut self, chain: u64) {
        match self.state.autoplay.on_trigger(chain, self.state.games_loaded.is_loaded()) {
            Step::Idle => debug!(chain, "autoplay trigger ignored"),
            Step::PlayRound { next_in } => {
                self.play_round();
                schedule::after(next_in, self.msg_tx.clone(), Msg::Trigger(chain));
            }
            Step::Retry { next_in } => {
                if self.state.games_loaded.is_not_found() {
                    self.recover();
                }
                schedule::after(next_in, self.msg_tx.clone(), Msg::Trigger(chain));
            }
        }
    }

    /// Games data failed to load: ask again once, and hold games_loaded at
    /// Waiting so the fast retry doesn't re-issue it.
    fn recover(&mut self) {
        info!("games data unavailable, reloading");
        self.state.games_loaded = MaybeLoad::waiting();
        if self.state.selected_pool().is_some() {
            self.load_pool_info();
        } else {
            self.refresh();
        }
    }
}

fn stale(kind: &'static str, g: Generation) {
    STALE_RESPONSES.with_label_values(&[kind]).inc();
    debug!(kind, generation = %g, "stale answer dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellDetail, CellState, GameState};
    use crate::fetcher::mock::MockFetcher;
    use crate::fetcher::Method;
    use serde_json::json;
    use tokio::time::{timeout_at, Duration, Instant};

    fn fighter(id: &str, name: &str) -> Fighter {
        Fighter { id: id.into(), name: name.into(), wins: 1, losses: 0, draws: 2 }
    }

    fn pool(id: &str) -> Pool {
        Pool { id: id.into(), generation: 0, fighters: vec![], games_completed: false }
    }

    fn game(id: &str) -> Game {
        Game { id: id.into(), state: GameState::PlayerOneTurn, pool: None, generation: None }
    }

    fn details(one: &str, two: &str) -> GameDetails {
        GameDetails {
            player_one: fighter(one, one),
            player_two: fighter(two, two),
            cell_details: vec![CellDetail { grid_index: 4, state: CellState::Cross }],
        }
    }

    fn backend() -> MockFetcher {
        let mock = MockFetcher::new();
        mock.on(Method::Get, "/api/pool", vec![pool("p1"), pool("p2")])
            .on(Method::Get, "/api/pool/p1/fighters", vec![fighter("ada", "ada"), fighter("bob", "bob")])
            .on(Method::Get, "/api/pool/p1/games", vec![game("g1"), game("g2")])
            .on(Method::Get, "/api/game/g1/details/", details("zed", "ada"))
            .on(Method::Get, "/api/game/g2/details/", details("ada", "bob"))
            .on(Method::Put, "/api/pool/p1/", json!(null))
            .on(Method::Get, "/api/pool/p2/fighters", vec![fighter("cy", "cy")])
            .on(Method::Get, "/api/pool/p2/games", vec![game("g3")])
            .on(Method::Get, "/api/game/g3/details/", details("cy", "dee"));
        mock
    }

    fn view(mock: &MockFetcher) -> PoolsView<MockFetcher> {
        PoolsView::new(Api::new(mock.clone()), AutoPlay::default(), RecordTx::default()).0
    }

    /// Handle internal messages (answers, triggers) for `d` of virtual time.
    async fn run_for(v: &mut PoolsView<MockFetcher>, d: Duration) {
        let deadline = Instant::now() + d;
        while let Ok(Some(msg)) = timeout_at(deadline, v.msg_rx.recv()).await {
            v.on_message(msg);
        }
    }

    async fn mounted(mock: &MockFetcher) -> PoolsView<MockFetcher> {
        let mut v = view(mock);
        v.refresh();
        run_for(&mut v, Duration::from_millis(100)).await;
        v
    }

    #[tokio::test(start_paused = true)]
    async fn mount_selects_first_pool_and_collects_boards() {
        let mock = backend();
        let v = mounted(&mock).await;

        assert_eq!(v.state().current_pool_index, just(Selection::Pool(0)));
        assert!(v.state().games_loaded.is_loaded());
        match v.state().main_block() {
            MainBlock::Boards { games, complete } => {
                assert!(complete);
                let keys: Vec<_> = games.iter().map(PoolGame::sort_key).collect();
                assert_eq!(keys, vec!["ada bob", "zed ada"]);
                assert_eq!(games[0].board.cell(4), Some(CellState::Cross));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_with_loaded_games_plays_then_waits_a_second() {
        let mock = backend();
        let mut v = mounted(&mock).await;

        v.on_command(Command::AutoPlay);
        run_for(&mut v, Duration::from_millis(500)).await;
        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 1);

        run_for(&mut v, Duration::from_millis(600)).await;
        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_without_loaded_games_retries_fast_and_skips_round() {
        let mock = backend();
        mock.delay(Method::Get, "/api/game/g2/details/", Duration::from_millis(2_000));
        let mut v = mounted(&mock).await;
        assert!(!v.state().games_loaded.is_loaded());
        assert_eq!(v.state().main_block(), MainBlock::LoadingBoards);

        v.on_command(Command::AutoPlay);
        run_for(&mut v, Duration::from_millis(1_850)).await;
        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 0);

        // boards land at ~2000ms; the next 10ms retry plays the round
        run_for(&mut v, Duration::from_millis(70)).await;
        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_turns_scheduled_trigger_into_no_op() {
        let mock = backend();
        let mut v = mounted(&mock).await;

        v.on_command(Command::AutoPlay);
        v.on_command(Command::Pause);
        run_for(&mut v, Duration::from_millis(3_000)).await;
        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 1);
        assert!(!v.state().autoplay.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_pool_list_is_dropped() {
        let mock = backend();
        mock.delay(Method::Get, "/api/pool", Duration::from_millis(100))
            .once(Method::Get, "/api/pool", vec![pool("old")]);
        let mut v = view(&mock);
        v.refresh();
        v.refresh();
        run_for(&mut v, Duration::from_millis(300)).await;

        let ids: Vec<_> = v.state().pools.value().unwrap().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(mock.calls(Method::Get, "/api/pool/old/games"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_pool_drops_boards_of_previous_pool() {
        let mock = backend();
        mock.delay(Method::Get, "/api/game/g1/details/", Duration::from_millis(500))
            .delay(Method::Get, "/api/game/g2/details/", Duration::from_millis(500));
        let mut v = mounted(&mock).await;

        v.on_command(Command::Select(1));
        run_for(&mut v, Duration::from_millis(1_000)).await;

        assert!(v.state().games_loaded.is_loaded());
        assert_eq!(v.state().boards.received(), 1);
        match v.state().main_block() {
            MainBlock::Boards { games, .. } => assert_eq!(games[0].game_id, "g3"),
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn selection_is_ignored_while_round_in_flight() {
        let mock = backend();
        mock.delay(Method::Put, "/api/pool/p1/", Duration::from_millis(1_000));
        let mut v = mounted(&mock).await;

        v.on_command(Command::Play);
        assert!(v.state().games_loaded.is_waiting());
        v.on_command(Command::Select(1));
        assert_eq!(v.state().current_pool_index, just(Selection::Pool(0)));

        run_for(&mut v, Duration::from_millis(1_500)).await;
        assert!(v.state().games_loaded.is_loaded());
        v.on_command(Command::Select(1));
        assert_eq!(v.state().current_pool_index, just(Selection::Pool(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn round_finishing_after_leaving_the_pool_does_not_wedge() {
        let mock = backend();
        mock.delay(Method::Put, "/api/pool/p1/", Duration::from_millis(500));
        let mut v = mounted(&mock).await;

        v.on_command(Command::Play);
        v.on_command(Command::NewPool);
        run_for(&mut v, Duration::from_millis(1_000)).await;

        assert_eq!(v.state().main_block(), MainBlock::NewPoolForm);
        assert!(!v.state().games_loaded.is_waiting());
        v.on_command(Command::Select(1));
        assert_eq!(v.state().current_pool_index, just(Selection::Pool(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn create_validates_size_then_selects_new_pool() {
        let mock = backend();
        let mut v = mounted(&mock).await;

        v.on_command(Command::Create(3));
        run_for(&mut v, Duration::from_millis(100)).await;
        assert_eq!(mock.calls(Method::Post, "/api/pool/"), 0);

        mock.on(Method::Post, "/api/pool/", pool("p3"))
            .on(Method::Get, "/api/pool", vec![pool("p1"), pool("p2"), pool("p3")])
            .on(Method::Get, "/api/pool/p3/fighters", Vec::<Fighter>::new())
            .on(Method::Get, "/api/pool/p3/games", Vec::<Game>::new());
        v.on_command(Command::NewPool);
        v.on_command(Command::Create(10));
        run_for(&mut v, Duration::from_millis(100)).await;

        assert_eq!(mock.calls(Method::Post, "/api/pool/"), 1);
        assert_eq!(v.state().current_pool_index, just(Selection::Pool(2)));
        // no games: the empty collection counts as loaded
        assert!(v.state().games_loaded.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_board_surfaces_and_autoplay_recovers() {
        let mock = backend();
        mock.fail(Method::Get, "/api/game/g2/details/");
        let mut v = mounted(&mock).await;

        assert!(v.state().games_loaded.is_not_found());
        match v.state().main_block() {
            MainBlock::Boards { games, complete } => {
                assert!(!complete);
                assert_eq!(games.len(), 1);
            }
            other => panic!("unexpected view {other:?}"),
        }

        mock.on(Method::Get, "/api/game/g2/details/", details("ada", "bob"));
        v.on_command(Command::AutoPlay);
        run_for(&mut v, Duration::from_millis(200)).await;

        assert_eq!(mock.calls(Method::Put, "/api/pool/p1/"), 1);
        // mount, recovery, refresh after the round
        assert_eq!(mock.calls(Method::Get, "/api/pool/p1/games"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn games_not_found_shows_fighter_cards() {
        let mock = backend();
        mock.fail(Method::Get, "/api/pool/p1/games");
        let v = mounted(&mock).await;
        assert!(v.state().games_loaded.is_not_found());
        assert!(matches!(v.state().main_block(), MainBlock::FighterCards(f) if f.len() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_failure_clears_selection() {
        let mock = MockFetcher::new();
        mock.fail(Method::Get, "/api/pool");
        let v = mounted(&mock).await;
        assert_eq!(v.state().current_pool_index, nothing());
        assert_eq!(v.state().main_block(), MainBlock::PoolsError);
    }

    #[test]
    fn parses_commands() {
        assert_eq!("select 2".parse::<Command>(), Ok(Command::Select(2)));
        assert_eq!("c 10".parse::<Command>(), Ok(Command::Create(10)));
        assert_eq!("AUTO".parse::<Command>(), Ok(Command::AutoPlay));
        assert!("create".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[test]
    fn pool_size_rules() {
        assert_eq!(validate_pool_size(10), Ok(10));
        assert_eq!(validate_pool_size(1), Err(PoolSizeError::TooSmall(1)));
        assert_eq!(validate_pool_size(7), Err(PoolSizeError::Odd(7)));
    }
}
