//! Prometheus metrics and the scrape endpoint.
//!
//! Metric families are registered against the default registry and updated
//! from wherever the matching state change happens, mostly inside the shard
//! workers. The scrape endpoint is a bare hyper service bound to
//! [`METRICS_PORT`] that answers `GET /metrics` with the text exposition
//! format.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;

/// Fixed port of the scrape endpoint.
pub const METRICS_PORT: u16 = 20000;

lazy_static! {
    pub static ref LOCKED_LOCKS: IntGauge = register_int_gauge!(
        "locksmith_total_locked_locks",
        "The total number of locked locks"
    )
    .expect("metric registration");
    pub static ref ACQUIRES: IntCounter =
        register_int_counter!("locksmith_acquires", "The number of processed acquires")
            .expect("metric registration");
    pub static ref RELEASES: IntCounter =
        register_int_counter!("locksmith_releases", "The number of processed releases")
            .expect("metric registration");
    pub static ref REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "locksmith_rejections",
        "The number of rejections due to bad manners and unnecessary releases/acquires",
        &["reason"]
    )
    .expect("metric registration");
}

/// Serve the scrape endpoint forever. Spawned as a background task when
/// metrics are enabled; bind errors surface in the returned result.
pub async fn serve() -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], METRICS_PORT).into();
    let listener = TcpListener::bind(addr).await?;
    log::info!("metrics endpoint listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_scrape))
                .await
            {
                log::debug!("metrics connection error: {}", err);
            }
        });
    }
}

async fn handle_scrape(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .expect("static response");
        return Ok(response);
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        log::error!("failed to encode metrics: {}", err);
        let response = Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::new()))
            .expect("static response");
        return Ok(response);
    }

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(Full::new(Bytes::from(buffer)))
        .expect("static response");
    Ok(response)
}
