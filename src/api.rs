// ===============================
// src/api.rs
// ===============================
//
// Typed backend endpoints on top of a Fetcher. Every call except login
// forwards the session credentials.
//
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{
    CellDetail, Fighter, Game, GameDetails, LoginRequest, NewGame, NewPool, Play, Pool, SessionToken,
};
use crate::fetcher::{Body, FetchOpts, Fetcher, Method, NetworkError};

#[derive(Clone)]
pub struct Api<F> {
    fetcher: F,
}

fn decode<T: DeserializeOwned>(method: Method, path: &str, body: &Body) -> Result<T, NetworkError> {
    serde_json::from_str(body).map_err(|e| NetworkError::new(method, path, format!("decode: {e}")))
}

fn encode<T: Serialize>(method: Method, path: &str, v: &T) -> Result<Value, NetworkError> {
    serde_json::to_value(v).map_err(|e| NetworkError::new(method, path, format!("encode: {e}")))
}

impl<F: Fetcher> Api<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let body = self.fetcher.get(path, FetchOpts::credentialed()).await?;
        decode(Method::Get, path, &body)
    }

    async fn put_empty(&self, path: &str) -> Result<(), NetworkError> {
        self.fetcher.put(path, None, FetchOpts::credentialed()).await.map(|_| ())
    }

    // ---- session ----
    pub async fn validate_session(&self) -> Result<(), NetworkError> {
        self.fetcher.get("/api/login/", FetchOpts::credentialed()).await.map(|_| ())
    }

    pub async fn login(&self, credential: &str) -> Result<String, NetworkError> {
        let path = "/api/login/";
        let req = encode(Method::Post, path, &LoginRequest { google_jwt: credential.to_string() })?;
        let body = self.fetcher.post(path, req, FetchOpts::anonymous()).await?;
        decode::<SessionToken>(Method::Post, path, &body).map(|t| t.session_token)
    }

    // ---- pools ----
    pub async fn pools(&self) -> Result<Vec<Pool>, NetworkError> {
        self.get_json("/api/pool").await
    }

    pub async fn create_pool(&self, fighter_number: u32) -> Result<Pool, NetworkError> {
        let path = "/api/pool/";
        let req = encode(Method::Post, path, &NewPool { fighter_number })?;
        let body = self.fetcher.post(path, req, FetchOpts::credentialed()).await?;
        decode(Method::Post, path, &body)
    }

    /// Play one round of every active match in the pool.
    pub async fn advance_pool(&self, pool_id: &str) -> Result<(), NetworkError> {
        self.put_empty(&format!("/api/pool/{pool_id}/")).await
    }

    pub async fn pool_fighters(&self, pool_id: &str) -> Result<Vec<Fighter>, NetworkError> {
        self.get_json(&format!("/api/pool/{pool_id}/fighters")).await
    }

    pub async fn pool_games(&self, pool_id: &str) -> Result<Vec<Game>, NetworkError> {
        self.get_json(&format!("/api/pool/{pool_id}/games")).await
    }

    // ---- games ----
    pub async fn game(&self, game_id: &str) -> Result<Game, NetworkError> {
        self.get_json(&format!("/api/game/{game_id}")).await
    }

    /// Advance a match by one ply.
    pub async fn advance_game(&self, game_id: &str) -> Result<(), NetworkError> {
        self.put_empty(&format!("/api/game/{game_id}/")).await
    }

    pub async fn game_cells(&self, game_id: &str) -> Result<Vec<CellDetail>, NetworkError> {
        self.get_json(&format!("/api/game/{game_id}/cells")).await
    }

    pub async fn game_details(&self, game_id: &str) -> Result<GameDetails, NetworkError> {
        self.get_json(&format!("/api/game/{game_id}/details/")).await
    }

    pub async fn new_game(&self, first: &str, second: &str) -> Result<Game, NetworkError> {
        let path = "/api/game/new/";
        let req = encode(
            Method::Post,
            path,
            &NewGame { first_fighter: first.to_string(), second_fighter: second.to_string() },
        )?;
        let body = self.fetcher.post(path, req, FetchOpts::credentialed()).await?;
        decode(Method::Post, path, &body)
    }

    pub async fn plays(&self, game_id: &str) -> Result<Vec<Play>, NetworkError> {
        self.get_json(&format!("/api/plays/{game_id}/")).await
    }

    // ---- fighters ----
    pub async fn fighters(&self) -> Result<Vec<Fighter>, NetworkError> {
        self.get_json("/api/fighters/").await
    }

    pub async fn fighter(&self, fighter_id: &str) -> Result<Fighter, NetworkError> {
        self.get_json(&format!("/api/fighters/{fighter_id}")).await
    }
}
