use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use claimmap_shared::ClaimSnapshot;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::adapters::BackendKind;
use crate::config::{upstream_connect_timeout, upstream_http_timeout};

/// A backend's latest published layer, serialized once at publish time and
/// shared by every request via Arc.
#[derive(Debug, Clone)]
pub struct PublishedLayer {
    pub seq: u64,
    pub generated_at: DateTime<Utc>,
    pub territory_count: usize,
    pub warp_count: usize,
    pub json: Arc<Bytes>,
}

#[derive(Clone)]
pub struct AppState {
    /// Latest claim snapshot from upstream. Replaced wholesale, never mutated.
    pub claims: Arc<RwLock<Arc<ClaimSnapshot>>>,
    pub layers: Arc<DashMap<BackendKind, PublishedLayer>>,
    pub http_client: reqwest::Client,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    claim_fetch_failures_total: AtomicU64,
    pipeline_runs_total: AtomicU64,
    pipeline_failures_total: AtomicU64,
    skipped_overlapping_runs_total: AtomicU64,
    discarded_batches_total: AtomicU64,
    published_batches_total: AtomicU64,
    layer_requests_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilitySnapshot {
    pub claim_fetch_failures_total: u64,
    pub pipeline_runs_total: u64,
    pub pipeline_failures_total: u64,
    pub skipped_overlapping_runs_total: u64,
    pub discarded_batches_total: u64,
    pub published_batches_total: u64,
    pub layer_requests_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            claim_fetch_failures_total: self.claim_fetch_failures_total.load(Ordering::Relaxed),
            pipeline_runs_total: self.pipeline_runs_total.load(Ordering::Relaxed),
            pipeline_failures_total: self.pipeline_failures_total.load(Ordering::Relaxed),
            skipped_overlapping_runs_total: self
                .skipped_overlapping_runs_total
                .load(Ordering::Relaxed),
            discarded_batches_total: self.discarded_batches_total.load(Ordering::Relaxed),
            published_batches_total: self.published_batches_total.load(Ordering::Relaxed),
            layer_requests_total: self.layer_requests_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_claim_fetch_failure(&self) {
        self.claim_fetch_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline_run(&self) {
        self.pipeline_runs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline_failure(&self) {
        self.pipeline_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_overlapping_run(&self) {
        self.skipped_overlapping_runs_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_batch(&self) {
        self.discarded_batches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published_batch(&self) {
        self.published_batches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_layer_request(&self) {
        self.layer_requests_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new() -> Self {
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("claimmap/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(connect_timeout)
                    .build()
            })
            .unwrap_or_else(|e| {
                panic!("failed to build timeout-configured HTTP client: {e}");
            });
        Self {
            claims: Arc::new(RwLock::new(Arc::new(ClaimSnapshot::default()))),
            layers: Arc::new(DashMap::new()),
            http_client,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    pub async fn current_claims(&self) -> Arc<ClaimSnapshot> {
        Arc::clone(&*self.claims.read().await)
    }

    pub async fn replace_claims(&self, snapshot: ClaimSnapshot) {
        *self.claims.write().await = Arc::new(snapshot);
    }
}
