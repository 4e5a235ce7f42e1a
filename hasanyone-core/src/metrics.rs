//! Request counters for the HTTP boundary.
//!
//! Counters are process-wide atomics owned by the gateway; the pipeline itself
//! keeps no state between requests.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::ErrorKind;
use crate::types::Novelty;

#[derive(Debug)]
pub struct GatewayMetrics {
    requests: AtomicU64,
    novel: AtomicU64,
    not_novel: AtomicU64,
    unknown: AtomicU64,
    validation_errors: AtomicU64,
    retrieval_errors: AtomicU64,
    model_errors: AtomicU64,
    config_errors: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub novel: u64,
    pub not_novel: u64,
    pub unknown: u64,
    pub validation_errors: u64,
    pub retrieval_errors: u64,
    pub model_errors: u64,
    pub config_errors: u64,
}

impl MetricsSnapshot {
    pub fn succeeded(&self) -> u64 {
        self.novel + self.not_novel + self.unknown
    }

    pub fn failed(&self) -> u64 {
        self.validation_errors + self.retrieval_errors + self.model_errors + self.config_errors
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            novel: AtomicU64::new(0),
            not_novel: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            retrieval_errors: AtomicU64::new(0),
            model_errors: AtomicU64::new(0),
            config_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verdict(&self, novelty: Novelty) {
        let counter = match novelty {
            Novelty::Yes => &self.novel,
            Novelty::No => &self.not_novel,
            Novelty::Unknown => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Validation => &self.validation_errors,
            ErrorKind::Retrieval => &self.retrieval_errors,
            ErrorKind::Model => &self.model_errors,
            ErrorKind::Config => &self.config_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            novel: self.novel.load(Ordering::Relaxed),
            not_novel: self.not_novel.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            retrieval_errors: self.retrieval_errors.load(Ordering::Relaxed),
            model_errors: self.model_errors.load(Ordering::Relaxed),
            config_errors: self.config_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
