// ===============================
// src/session.rs
// ===============================
//
// Current-user session:
// - SessionStore : one explicitly created value, injected into the fetcher and
//                  the views. set() at login success, clear() at logout or
//                  when the backend rejects the token.
// - token expiry comes from the JWT `exp` claim of the session token
// - the token is the only state persisted locally (SESSION_FILE)
//
use std::path::Path;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::api::Api;
use crate::fetcher::Fetcher;
use crate::maybe::MaybeLoad;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn from_token(token: String) -> Self {
        let expires_at = token_expiry(&token);
        Self { token, expires_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io { path: String, source: std::io::Error },
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: Session) {
        if let Ok(mut g) = self.inner.write() {
            *g = Some(session);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.inner.write() {
            *g = None;
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().ok().and_then(|g| g.clone())
    }

    /// Live token, or nothing once it has expired.
    pub fn token(&self) -> Option<String> {
        self.current()
            .filter(|s| !s.is_expired(Utc::now()))
            .map(|s| s.token)
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let raw = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&raw).ok()?;
    Utc.timestamp_opt(claims.exp, 0).single()
}

/// Ask the backend whether the stored token is still valid.
pub async fn validate<F: Fetcher>(api: &Api<F>, store: &SessionStore) -> MaybeLoad<String> {
    let Some(token) = store.token() else {
        if store.current().is_some() {
            info!("session token expired");
            store.clear();
        } else {
            info!("no session token");
        }
        return MaybeLoad::NotFound;
    };
    match api.validate_session().await {
        Ok(()) => {
            info!("found valid session token");
            MaybeLoad::Loaded(token)
        }
        Err(e) => {
            warn!(%e, "session token rejected");
            store.clear();
            MaybeLoad::NotFound
        }
    }
}

/// Exchange an external credential for a session.
pub async fn login<F: Fetcher>(api: &Api<F>, store: &SessionStore, credential: &str) -> MaybeLoad<String> {
    match api.login(credential).await {
        Ok(token) => {
            let session = Session::from_token(token.clone());
            info!(expires_at = ?session.expires_at, "logged in");
            store.set(session);
            MaybeLoad::Loaded(token)
        }
        Err(e) => {
            warn!(%e, "login failed");
            MaybeLoad::NotFound
        }
    }
}

pub async fn load_token_file(path: &str) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(s) => Some(s.trim().to_string()).filter(|t| !t.is_empty()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(?e, %path, "session: read failed");
            None
        }
    }
}

pub async fn save_token_file(path: &str, token: &str) -> Result<(), SessionError> {
    let io = |source| SessionError::Io { path: path.to_string(), source };
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(io)?;
        }
    }
    fs::write(path, token).await.map_err(io)
}

pub async fn remove_token_file(path: &str) -> Result<(), SessionError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SessionError::Io { path: path.to_string(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionToken;
    use crate::fetcher::mock::MockFetcher;
    use crate::fetcher::Method;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn expiry_is_read_from_claims() {
        let t = jwt_with_exp(1_900_000_000);
        assert_eq!(token_expiry(&t), Utc.timestamp_opt(1_900_000_000, 0).single());
        assert_eq!(token_expiry("not-a-jwt"), None);
    }

    #[test]
    fn expired_token_is_not_offered() {
        let store = SessionStore::new();
        store.set(Session::from_token(jwt_with_exp(1_000)));
        assert!(store.current().is_some());
        assert_eq!(store.token(), None);

        let live = jwt_with_exp(Utc::now().timestamp() + 3600);
        store.set(Session::from_token(live.clone()));
        assert_eq!(store.token(), Some(live));
    }

    #[tokio::test]
    async fn login_sets_and_rejection_clears() {
        let mock = MockFetcher::new();
        let token = jwt_with_exp(Utc::now().timestamp() + 3600);
        mock.on(Method::Post, "/api/login/", SessionToken { session_token: token.clone() });
        mock.fail(Method::Get, "/api/login/");
        let api = Api::new(mock.clone());
        let store = SessionStore::new();

        assert_eq!(login(&api, &store, "google-credential").await, MaybeLoad::Loaded(token));
        assert_eq!(mock.credentialed(Method::Post, "/api/login/"), Some(false));

        assert!(validate(&api, &store).await.is_not_found());
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn expired_token_is_cleared_without_asking_backend() {
        let mock = MockFetcher::new();
        let api = Api::new(mock.clone());
        let store = SessionStore::new();
        store.set(Session::from_token(jwt_with_exp(1_000)));

        assert!(validate(&api, &store).await.is_not_found());
        assert_eq!(store.current(), None);
        assert_eq!(mock.calls(Method::Get, "/api/login/"), 0);
    }

    #[tokio::test]
    async fn validate_without_token_skips_backend() {
        let mock = MockFetcher::new();
        let api = Api::new(mock.clone());
        assert!(validate(&api, &SessionStore::new()).await.is_not_found());
        assert_eq!(mock.calls(Method::Get, "/api/login/"), 0);
    }
}
