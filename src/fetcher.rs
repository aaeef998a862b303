// ===============================
// src/fetcher.rs
// ===============================
//
// Remote Resource Fetcher boundary:
// - trait Fetcher : get / post / put, async, one failure kind (NetworkError)
// - HttpFetcher   : reqwest client against BACKEND_URL, forwards the session
//                   cookie when FetchOpts::with_credentials is set
//
// Non-2xx statuses, transport errors and decode errors all become NetworkError;
// callers never branch on the cause.
//
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::COOKIE;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::metrics::{FETCH_LATENCY_MS, HTTP_REQUESTS};
use crate::session::SessionStore;

pub type Body = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method { Get, Post, Put }

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self { Method::Get => "GET", Method::Post => "POST", Method::Put => "PUT" }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m { Method::Get => reqwest::Method::GET, Method::Post => reqwest::Method::POST, Method::Put => reqwest::Method::PUT }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOpts { pub with_credentials: bool }

impl FetchOpts {
    pub const fn credentialed() -> Self { Self { with_credentials: true } }
    pub const fn anonymous() -> Self { Self { with_credentials: false } }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{method} {path}: {reason}")]
pub struct NetworkError { pub method: Method, pub path: String, pub reason: String }

impl NetworkError {
    pub fn new(method: Method, path: &str, reason: impl fmt::Display) -> Self {
        Self { method, path: path.to_string(), reason: reason.to_string() }
    }
}

pub trait Fetcher: Clone + Send + Sync + 'static {
    fn get(&self, path: &str, opts: FetchOpts) -> impl Future<Output = Result<Body, NetworkError>> + Send;
    fn post(&self, path: &str, body: Value, opts: FetchOpts) -> impl Future<Output = Result<Body, NetworkError>> + Send;
    fn put(&self, path: &str, body: Option<Value>, opts: FetchOpts) -> impl Future<Output = Result<Body, NetworkError>> + Send;
}

#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    base: Url,
    session: SessionStore,
}

impl HttpFetcher {
    pub fn new(base: &str, timeout: Duration, session: SessionStore) -> Result<Self, NetworkError> {
        let base = Url::parse(base).map_err(|e| NetworkError::new(Method::Get, base, e))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::new(Method::Get, base.as_str(), e))?;
        Ok(Self { http, base, session })
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>, opts: FetchOpts) -> Result<Body, NetworkError> {
        let started = Instant::now();
        let res = self.send_inner(method, path, body, opts).await;
        FETCH_LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        let outcome = if res.is_ok() { "ok" } else { "err" };
        HTTP_REQUESTS.with_label_values(&[method.as_str(), outcome]).inc();
        res
    }

    async fn send_inner(&self, method: Method, path: &str, body: Option<Value>, opts: FetchOpts) -> Result<Body, NetworkError> {
        let url = self.base.join(path).map_err(|e| NetworkError::new(method, path, e))?;
        let mut req = self.http.request(method.into(), url);
        if opts.with_credentials {
            if let Some(token) = self.session.token() {
                req = req.header(COOKIE, format!("session_id={token}"));
            }
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        let rsp = req.send().await.map_err(|e| NetworkError::new(method, path, e))?;
        let code = rsp.status();
        let text = rsp.text().await.map_err(|e| NetworkError::new(method, path, e))?;
        if !code.is_success() {
            return Err(NetworkError::new(method, path, format!("status {code}: {text}")));
        }
        tracing::debug!(%method, %path, %code, "fetched");
        Ok(text)
    }
}

impl Fetcher for HttpFetcher {
    async fn get(&self, path: &str, opts: FetchOpts) -> Result<Body, NetworkError> {
        self.send(Method::Get, path, None, opts).await
    }

    async fn post(&self, path: &str, body: Value, opts: FetchOpts) -> Result<Body, NetworkError> {
        self.send(Method::Post, path, Some(body), opts).await
    }

    async fn put(&self, path: &str, body: Option<Value>, opts: FetchOpts) -> Result<Body, NetworkError> {
        self.send(Method::Put, path, body, opts).await
    }
}
