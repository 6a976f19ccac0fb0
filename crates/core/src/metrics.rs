//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Requests (outcomes, duration)
//! - Admission queue (running, waiting)
//! - Codec invocations
//! - Scratch file lifecycle (reservations, releases, orphans)

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
};

/// Requests total by outcome.
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediapress_requests_total", "Total requests processed"),
        &["outcome"], // "delivered", "text", "no_media", "rejected", "error"
    )
    .unwrap()
});

/// End-to-end request duration in seconds.
pub static REQUEST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mediapress_request_duration_seconds",
            "End-to-end duration of requests",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .unwrap()
});

/// Heavy transformations currently holding an admission slot.
pub static QUEUE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediapress_queue_running",
        "Heavy transformations currently running",
    )
    .unwrap()
});

/// Submissions waiting for an admission slot.
pub static QUEUE_WAITING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediapress_queue_waiting",
        "Submissions waiting for an admission slot",
    )
    .unwrap()
});

/// Codec invocations by program and result.
pub static CODEC_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediapress_codec_invocations_total",
            "External codec invocations",
        ),
        &["program", "result"], // result: "success", "failure", "timeout"
    )
    .unwrap()
});

/// Scratch files reserved.
pub static SCRATCH_RESERVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediapress_scratch_reserved_total",
        "Scratch files reserved",
    )
    .unwrap()
});

/// Scratch files removed from disk.
pub static SCRATCH_RELEASED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediapress_scratch_released_total",
        "Scratch files removed from disk",
    )
    .unwrap()
});

/// Scratch files reserved with no session in scope; these leak.
pub static SCRATCH_ORPHANS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediapress_scratch_orphans_total",
        "Scratch files reserved outside of any session",
    )
    .unwrap()
});

/// Size fits total by result.
pub static SIZE_FITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediapress_size_fits_total", "Size fit runs"),
        &["result"], // "untouched", "fitted", "failed", "rejected"
    )
    .unwrap()
});

/// Ladder rungs tried before a size fit resolved.
pub static FIT_ROUNDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mediapress_fit_rounds",
            "Tolerance ladder rungs tried per size fit",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(REQUEST_DURATION.clone()),
        Box::new(QUEUE_RUNNING.clone()),
        Box::new(QUEUE_WAITING.clone()),
        Box::new(CODEC_INVOCATIONS.clone()),
        Box::new(SCRATCH_RESERVED.clone()),
        Box::new(SCRATCH_RELEASED.clone()),
        Box::new(SCRATCH_ORPHANS.clone()),
        Box::new(SIZE_FITS_TOTAL.clone()),
        Box::new(FIT_ROUNDS.clone()),
    ]
}
