// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};
use std::fmt;

pub type FighterId = String;
pub type PoolId = String;
pub type GameId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fighter { pub id: FighterId, pub name: String, pub wins: i64, pub losses: i64, pub draws: i64 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub generation: i64,
    #[serde(default)]
    pub fighters: Vec<FighterId>,
    #[serde(default)]
    pub games_completed: bool,
}

/// Match state as the backend encodes it (0, 1, 2). `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GameState { PlayerOneTurn, PlayerTwoTurn, Completed }

impl GameState {
    pub fn is_completed(&self) -> bool { matches!(self, GameState::Completed) }

    pub fn describe(&self) -> &'static str {
        match self {
            GameState::PlayerOneTurn => "player one turn",
            GameState::PlayerTwoTurn => "player two turn",
            GameState::Completed => "completed",
        }
    }
}

impl TryFrom<u8> for GameState {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GameState::PlayerOneTurn),
            1 => Ok(GameState::PlayerTwoTurn),
            2 => Ok(GameState::Completed),
            other => Err(format!("unknown game state {other}")),
        }
    }
}

impl From<GameState> for u8 {
    fn from(s: GameState) -> u8 {
        match s { GameState::PlayerOneTurn => 0, GameState::PlayerTwoTurn => 1, GameState::Completed => 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub state: GameState,
    #[serde(default)]
    pub pool: Option<PoolId>,
    #[serde(default)]
    pub generation: Option<i64>,
}

/// Which side of a match a fighter plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play { pub id: String, pub game: GameId, pub fighter: FighterId, pub player_one: bool }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CellState { #[default] Empty, Cross, Nought }

impl TryFrom<u8> for CellState {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CellState::Empty),
            1 => Ok(CellState::Cross),
            2 => Ok(CellState::Nought),
            other => Err(format!("unknown cell state {other}")),
        }
    }
}

impl From<CellState> for u8 {
    fn from(c: CellState) -> u8 {
        match c { CellState::Empty => 0, CellState::Cross => 1, CellState::Nought => 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDetail { pub grid_index: usize, pub state: CellState }

/// Denormalized read model of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDetails {
    pub player_one: Fighter,
    pub player_two: Fighter,
    #[serde(default)]
    pub cell_details: Vec<CellDetail>,
}

pub const BOARD_CELLS: usize = 9;

/// 3x3 board, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board(pub [CellState; BOARD_CELLS]);

impl Board {
    pub fn from_details(cells: &[CellDetail]) -> Self {
        let mut b = Board::default();
        b.merge(cells);
        b
    }

    /// Sparse update: only indices present in `cells` change, later
    /// duplicates win. Returns how many entries were out of range.
    pub fn merge(&mut self, cells: &[CellDetail]) -> usize {
        let mut skipped = 0;
        for c in cells {
            match self.0.get_mut(c.grid_index) {
                Some(slot) => *slot = c.state,
                None => skipped += 1,
            }
        }
        skipped
    }

    pub fn cell(&self, idx: usize) -> Option<CellState> { self.0.get(idx).copied() }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.0.chunks(3).enumerate() {
            if row > 0 { f.write_str("/")?; }
            for c in cells {
                let ch = match c { CellState::Empty => '.', CellState::Cross => 'X', CellState::Nought => 'O' };
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}

// Request/response bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPool { pub fighter_number: u32 }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGame { pub first_fighter: FighterId, pub second_fighter: FighterId }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest { pub google_jwt: String }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken { pub session_token: String }

/// Recorded to the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Pools(Vec<Pool>),
    Game(Game),
    Board { game_id: GameId, board: Board },
    Round { pool_id: PoolId, ok: bool },
    Note(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_board() -> Board {
        Board([
            CellState::Cross, CellState::Nought, CellState::Cross,
            CellState::Nought, CellState::Cross, CellState::Nought,
            CellState::Nought, CellState::Cross, CellState::Nought,
        ])
    }

    #[test]
    fn merge_is_sparse() {
        let prior = full_board();
        let mut b = prior;
        let patch = [
            CellDetail { grid_index: 0, state: CellState::Empty },
            CellDetail { grid_index: 4, state: CellState::Empty },
            CellDetail { grid_index: 8, state: CellState::Cross },
        ];
        assert_eq!(b.merge(&patch), 0);
        for i in 0..BOARD_CELLS {
            if [0, 4, 8].contains(&i) {
                assert_eq!(b.cell(i), Some(patch.iter().find(|c| c.grid_index == i).unwrap().state));
            } else {
                assert_eq!(b.cell(i), prior.cell(i), "cell {i} changed");
            }
        }
    }

    #[test]
    fn merge_last_write_wins_and_skips_out_of_range() {
        let mut b = Board::default();
        let skipped = b.merge(&[
            CellDetail { grid_index: 2, state: CellState::Cross },
            CellDetail { grid_index: 2, state: CellState::Nought },
            CellDetail { grid_index: 9, state: CellState::Cross },
        ]);
        assert_eq!(skipped, 1);
        assert_eq!(b.cell(2), Some(CellState::Nought));
        assert_eq!(b.to_string(), "..O/.../...");
    }

    #[test]
    fn decodes_backend_shapes() {
        let g: Game = serde_json::from_str(r#"{"id":"g1","state":2,"pool":null,"generation":3}"#).unwrap();
        assert!(g.state.is_completed());
        assert_eq!(g.pool, None);

        let p: Pool = serde_json::from_str(
            r#"{"id":"p1","generation":4,"fighters":["a","b"],"games_completed":false,"user":"u1"}"#,
        )
        .unwrap();
        assert_eq!(p.fighters.len(), 2);

        let cells: Vec<CellDetail> = serde_json::from_str(r#"[{"grid_index":4,"state":1}]"#).unwrap();
        assert_eq!(Board::from_details(&cells).cell(4), Some(CellState::Cross));

        assert!(serde_json::from_str::<Game>(r#"{"id":"g","state":7}"#).is_err());
    }
}
