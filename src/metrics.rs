// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::{error, info};

// Single custom registry (everything is registered here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Backend traffic --------
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("backend_requests_total", "backend requests (labels: method, outcome)"),
        &["method", "outcome"],
    )
    .expect("metric definition")
});

pub static FETCH_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("backend_fetch_latency_ms", "backend round trip (ms)")
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]),
    )
    .expect("metric definition")
});

pub static STALE_RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stale_responses_total", "answers dropped for a superseded generation"),
        &["kind"],
    )
    .expect("metric definition")
});

// -------- Game polling --------
pub static GAME_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("game_ticks_total", "game poll ticks (label: outcome)"),
        &["outcome"],
    )
    .expect("metric definition")
});

pub static PLY_ADVANCES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ply_advances_total", "advance-game requests issued").expect("metric definition"));

// -------- Pools / autoplay --------
pub static ROUNDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pool_rounds_total", "pool rounds (label: outcome = ok|error|skipped)"),
        &["outcome"],
    )
    .expect("metric definition")
});

pub static AUTOPLAY_RUNNING: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("autoplay_running", "1 while autoplay is on").expect("metric definition"));

// ---- Config visibility ----
pub static CONFIG_BACKEND: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_backend", "configured backend (label: url)"), &["url"])
        .expect("metric definition")
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(HTTP_REQUESTS.clone())),
        REGISTRY.register(Box::new(FETCH_LATENCY_MS.clone())),
        REGISTRY.register(Box::new(STALE_RESPONSES.clone())),
        REGISTRY.register(Box::new(GAME_TICKS.clone())),
        REGISTRY.register(Box::new(PLY_ADVANCES.clone())),
        REGISTRY.register(Box::new(ROUNDS.clone())),
        REGISTRY.register(Box::new(AUTOPLAY_RUNNING.clone())),
        REGISTRY.register(Box::new(CONFIG_BACKEND.clone())),
    ] {
        if let Err(e) = m {
            error!(%e, "metrics: register failed");
        }
    }
}

/// Prometheus text format of everything registered.
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let resp = match req.uri().path() {
        "/" | "/metrics" => Response::builder()
            .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(encode_metrics())),
        _ => Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()),
    };
    Ok(resp.unwrap_or_else(|_| Response::new(Body::empty())))
}

/// Serve `/metrics` until the process exits. Port 0 disables the endpoint.
pub async fn serve_metrics(port: u16) {
    if port == 0 {
        info!("metrics endpoint disabled");
        return;
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = match Server::try_bind(&addr) {
        Ok(b) => b.serve(make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) })),
        Err(e) => {
            error!(%e, %addr, "metrics: bind failed");
            return;
        }
    };
    info!("metrics listening on http://{addr}/ (and /metrics)");
    if let Err(e) = server.await {
        error!(%e, "metrics server stopped");
    }
}
