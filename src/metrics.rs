//! Prometheus metrics for the assistant.
//!
//! Exposes:
//! - `agritech_bot_turn_total` (counter by modality and outcome)
//! - `agritech_bot_turn_duration_seconds` (histogram by modality)
//! - `agritech_bot_turn_inflight` (gauge by modality)
//! - `agritech_bot_stage_duration_seconds` (histogram by stage)
//! - `agritech_bot_stage_errors_total` (counter by stage)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::pipeline::{Modality, Stage, TurnOutcome};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static TURN_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "agritech_bot_turn_total",
        "Conversation turns by modality and outcome",
        &["modality", "outcome"]
    )
    .expect("failed to register turn counter")
});

static TURN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // 100ms up to ~3.5 minutes.
    let buckets =
        prometheus::exponential_buckets(0.1, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "agritech_bot_turn_duration_seconds",
        "End-to-end turn duration in seconds",
        &["modality"],
        buckets
    )
    .expect("failed to register turn duration histogram")
});

static TURN_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "agritech_bot_turn_inflight",
        "Turns currently being processed",
        &["modality"]
    )
    .expect("failed to register inflight gauge")
});

static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "agritech_bot_stage_duration_seconds",
        "External stage call duration in seconds",
        &["stage"],
        buckets
    )
    .expect("failed to register stage duration histogram")
});

static STAGE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "agritech_bot_stage_errors_total",
        "Failed or timed out stage calls",
        &["stage"]
    )
    .expect("failed to register stage error counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&TURN_TOTAL);
    Lazy::force(&TURN_DURATION);
    Lazy::force(&TURN_INFLIGHT);
    Lazy::force(&STAGE_DURATION);
    Lazy::force(&STAGE_ERRORS);
}

/// Increment the inflight gauge for a new turn.
pub fn record_turn_start(modality: Modality) {
    init_collectors();
    TURN_INFLIGHT.with_label_values(&[modality.as_str()]).inc();
}

/// Record turn completion with duration and outcome.
pub fn record_turn_result(modality: Modality, outcome: TurnOutcome, duration: Duration) {
    init_collectors();
    TURN_INFLIGHT.with_label_values(&[modality.as_str()]).dec();
    TURN_DURATION
        .with_label_values(&[modality.as_str()])
        .observe(duration.as_secs_f64());
    TURN_TOTAL
        .with_label_values(&[modality.as_str(), outcome.as_str()])
        .inc();
}

/// Record one external stage call.
pub fn record_stage(stage: Stage, duration: Duration, success: bool) {
    init_collectors();
    STAGE_DURATION
        .with_label_values(&[stage.as_str()])
        .observe(duration.as_secs_f64());
    if !success {
        STAGE_ERRORS.with_label_values(&[stage.as_str()]).inc();
    }
}

fn plain_response(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Full::from("encode error"),
        ));
    }

    let mut response = plain_response(StatusCode::OK, Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Full::new(Bytes::new()))),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
