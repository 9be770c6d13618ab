use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use claimmap_shared::build_batch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::adapters::{AdapterError, RendererAdapter};
use crate::config::MapConfig;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published { seq: u64 },
    EmptySnapshot,
    Discarded,
    Failed,
}

/// Marks a refresh as running until dropped, including on panic unwind.
#[derive(Debug)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    /// `None` while another holder is alive.
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Rebuild one backend's markers on a fixed interval. A tick that lands while
/// the previous run is still going is skipped, never queued.
pub async fn run(state: AppState, adapter: Arc<dyn RendererAdapter>, config: Arc<MapConfig>) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut interval = tokio::time::interval(config.refresh_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        backend = %adapter.kind(),
        interval_secs = config.refresh_interval_secs,
        "marker refresher started"
    );

    loop {
        interval.tick().await;

        let Some(guard) = InFlightGuard::acquire(&in_flight) else {
            state.observability.record_skipped_overlapping_run();
            debug!(backend = %adapter.kind(), "previous marker refresh still running, skipping tick");
            continue;
        };

        let state = state.clone();
        let adapter = Arc::clone(&adapter);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let _guard = guard;
            refresh_once(&state, adapter.as_ref(), &config).await;
        });
    }
}

pub async fn refresh_once(
    state: &AppState,
    adapter: &dyn RendererAdapter,
    config: &Arc<MapConfig>,
) -> RefreshOutcome {
    let backend = adapter.kind();
    if !adapter.is_available() {
        state.observability.record_discarded_batch();
        debug!(%backend, "backend unavailable, discarding refresh");
        return RefreshOutcome::Discarded;
    }

    let snapshot = state.current_claims().await;
    if snapshot.is_empty() {
        debug!(%backend, "claim snapshot is empty, nothing to render");
        return RefreshOutcome::EmptySnapshot;
    }

    state.observability.record_pipeline_run();
    let capabilities = adapter.capabilities();
    let pipeline_config = Arc::clone(config);
    let started = Instant::now();
    let batch = match tokio::task::spawn_blocking(move || {
        build_batch(&snapshot, &pipeline_config.pipeline, capabilities, Utc::now())
    })
    .await
    {
        Ok(batch) => batch,
        Err(e) => {
            state.observability.record_pipeline_failure();
            error!(%backend, error = %e, "marker pipeline task failed");
            return RefreshOutcome::Failed;
        }
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match adapter.apply(batch) {
        Ok(layer) => {
            state.observability.record_published_batch();
            info!(
                %backend,
                seq = layer.seq,
                territories = layer.territory_count,
                warps = layer.warp_count,
                elapsed_ms,
                "published marker layer"
            );
            RefreshOutcome::Published { seq: layer.seq }
        }
        Err(AdapterError::Unavailable(_)) => {
            state.observability.record_discarded_batch();
            debug!(%backend, "backend became unavailable, discarding batch");
            RefreshOutcome::Discarded
        }
        Err(e) => {
            state.observability.record_pipeline_failure();
            error!(%backend, error = %e, "failed to publish marker layer");
            RefreshOutcome::Failed
        }
    }
}
