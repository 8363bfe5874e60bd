//! # Watermark Pipeline
//!
//! One run takes an [`AssetId`] from `received` to a terminal outcome:
//!
//! ```text
//! received -> normalized -> lock_attempted -> locked | skip(contention)
//!   locked -> gate_checked -> skip(non_image)
//!          -> oracle_checked -> skip(already_processed)
//!          -> transforming -> writing -> released
//! ```
//!
//! Every run that acquires the lock releases it exactly once, whether the
//! guarded work completes, skips, fails or panics. Failures are never retried
//! ([`RetryPolicy::Never`]): the asset is left unmarked and the next genuine
//! trigger starts over.

use crate::consistency::{ConsistencyBuffer, ConsistencyConfig};
use crate::lock::{DistributedLock, LockError};
use crate::markers::MarkerStrategy;
use crate::metrics::PipelineMetrics;
use crate::store::{AssetStore, StoreError};
use crate::transform::{Transform, TransformError};
use crate::writer::TwoPhaseWriter;
use crate::{AssetId, ContentDigest};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

// ============================================================================
// States and Outcomes
// ============================================================================

/// States a run passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Normalized,
    LockAttempted,
    Locked,
    GateChecked,
    OracleChecked,
    Transforming,
    Writing,
    Released,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Normalized => "normalized",
            Self::LockAttempted => "lock_attempted",
            Self::Locked => "locked",
            Self::GateChecked => "gate_checked",
            Self::OracleChecked => "oracle_checked",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended without doing work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The trigger designated no asset
    NoIdentifier,

    /// Another run holds the lock for this asset
    Contention,

    /// The asset is not a raster image
    NonImage,

    /// The stored bytes are already our own output
    AlreadyProcessed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoIdentifier => "no_identifier",
            Self::Contention => "contention",
            Self::NonImage => "non_image",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a run
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The lock store could not be reached on acquire
    #[error("Lock store error: {0}")]
    LockStore(#[source] LockError),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(#[source] StoreError),

    #[error("Upstream write failed: {0}")]
    UpstreamWrite(#[source] StoreError),

    #[error("Transform failed: {0}")]
    Transform(#[source] TransformError),

    /// The guarded work panicked
    #[error("Run aborted: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LockStore(_) => "lock_store",
            Self::UpstreamFetch(_) => "upstream_fetch",
            Self::UpstreamWrite(_) => "upstream_write",
            Self::Transform(_) => "transform",
            Self::Internal { .. } => "internal",
        }
    }

    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LockStore(LockError::Unavailable { .. }) => true,
            Self::LockStore(LockError::CommandFailed { .. }) => false,
            Self::UpstreamFetch(e) | Self::UpstreamWrite(e) => e.is_transient(),
            Self::Transform(_) | Self::Internal { .. } => false,
        }
    }

    /// HTTP status reported by the store, if any
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamFetch(e) | Self::UpstreamWrite(e) => e.status(),
            _ => None,
        }
    }
}

/// Terminal result of a run
#[derive(Debug, Clone)]
pub enum Outcome {
    /// New content was written; `digest` names the stored bytes
    Completed { digest: ContentDigest },
    Skipped(SkipReason),
    Failed(PipelineError),
}

impl Outcome {
    /// Label value for `watermark_runs_total{outcome}`
    pub fn label(&self) -> String {
        match self {
            Self::Completed { .. } => "completed".to_string(),
            Self::Skipped(reason) => format!("skipped_{}", reason),
            Self::Failed(error) => format!("failed_{}", error.kind()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Skip reason, if the run was skipped
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// What happened during one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub asset_id: AssetId,
    pub stages: Vec<Stage>,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl RunReport {
    /// Whether the run passed through `stage`
    pub fn visited(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Retry behaviour after a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Failures are logged and the run ends; nothing is rescheduled
    #[default]
    Never,
}

impl RetryPolicy {
    /// Whether a failed run may be attempted again
    pub fn allows_retry(&self, _error: &PipelineError) -> bool {
        match self {
            Self::Never => false,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// The watermark pipeline
pub struct Pipeline {
    store: Arc<dyn AssetStore>,
    lock: DistributedLock,
    transform: Arc<dyn Transform>,
    writer: TwoPhaseWriter,
    markers: MarkerStrategy,
    consistency: ConsistencyBuffer,
    metrics: Arc<PipelineMetrics>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn AssetStore>,
        lock: DistributedLock,
        transform: Arc<dyn Transform>,
        markers: MarkerStrategy,
        consistency: ConsistencyConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let writer = TwoPhaseWriter::new(Arc::clone(&store), markers.clone());
        Self {
            store,
            lock,
            transform,
            writer,
            markers,
            consistency: ConsistencyBuffer::new(consistency),
            metrics,
            retry: RetryPolicy::Never,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Count a skip decided before any run started
    pub fn record_skip_without_run(&self, reason: SkipReason) {
        self.metrics
            .record_outcome(&Outcome::Skipped(reason).label());
    }

    /// Run the pipeline for one asset
    ///
    /// Never returns an error; failures are reported in the outcome.
    pub async fn run(&self, asset_id: AssetId) -> RunReport {
        let span = info_span!("watermark_run", asset_id = %asset_id);
        self.run_inner(asset_id).instrument(span).await
    }

    async fn run_inner(&self, asset_id: AssetId) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut stages = vec![Stage::Received, Stage::Normalized, Stage::LockAttempted];

        let outcome = match self.lock.acquire(&asset_id).await {
            Err(e) => Outcome::Failed(PipelineError::LockStore(e)),
            Ok(None) => {
                info!(asset_id = %asset_id, "Asset is already being processed; skipping");
                Outcome::Skipped(SkipReason::Contention)
            }
            Ok(Some(lease)) => {
                stages.push(Stage::Locked);
                let heartbeat = self.lock.start_heartbeat(&lease);

                let guarded = AssertUnwindSafe(self.guarded(&asset_id, &mut stages))
                    .catch_unwind()
                    .await;

                if let Some(heartbeat) = heartbeat {
                    heartbeat.stop();
                }
                if let Err(e) = self.lock.release(lease).await {
                    warn!(asset_id = %asset_id, error = %e, "Failed to release lock; entry will expire");
                }
                stages.push(Stage::Released);

                match guarded {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => Outcome::Failed(e),
                    Err(panic) => Outcome::Failed(PipelineError::Internal {
                        message: panic_message(panic.as_ref()),
                    }),
                }
            }
        };

        let duration = clock.elapsed();
        self.finish(&asset_id, &outcome, duration);

        RunReport {
            asset_id,
            stages,
            outcome,
            started_at,
            duration,
        }
    }

    /// Work done while holding the lock
    async fn guarded(
        &self,
        asset_id: &AssetId,
        stages: &mut Vec<Stage>,
    ) -> Result<Outcome, PipelineError> {
        self.consistency
            .settle(asset_id, self.store.as_ref())
            .await
            .map_err(PipelineError::UpstreamFetch)?;

        let metadata = self
            .store
            .fetch_metadata(asset_id)
            .await
            .map_err(PipelineError::UpstreamFetch)?;

        stages.push(Stage::GateChecked);
        if !metadata.is_raster_image() {
            info!(
                asset_id = %asset_id,
                media_type = metadata.media_type.as_deref().unwrap_or("unknown"),
                "Asset is not a raster image; skipping"
            );
            return Ok(Outcome::Skipped(SkipReason::NonImage));
        }

        let original = self
            .store
            .fetch_binary(asset_id)
            .await
            .map_err(PipelineError::UpstreamFetch)?;
        let digest = ContentDigest::of(&original);

        stages.push(Stage::OracleChecked);
        if self.markers.is_already_processed(&metadata, &digest) {
            info!(asset_id = %asset_id, digest = %digest, "Content already watermarked; skipping");
            return Ok(Outcome::Skipped(SkipReason::AlreadyProcessed));
        }

        stages.push(Stage::Transforming);
        let rendered = self.render(original).await?;

        stages.push(Stage::Writing);
        let digest = self
            .writer
            .apply(
                asset_id,
                &metadata,
                Bytes::from(rendered),
                self.transform.output_media_type(),
                self.transform.output_extension(),
            )
            .await
            .map_err(PipelineError::UpstreamWrite)?;

        Ok(Outcome::Completed { digest })
    }

    /// Render off the async executor
    async fn render(&self, original: Bytes) -> Result<Vec<u8>, PipelineError> {
        let transform = Arc::clone(&self.transform);
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || transform.render(&original))
            .await
            .map_err(|e| {
                PipelineError::Transform(TransformError::Aborted {
                    message: e.to_string(),
                })
            })?;

        let elapsed = started.elapsed();
        self.metrics.observe_render(elapsed);
        debug!(duration_ms = elapsed.as_millis() as u64, "Render finished");

        result.map_err(PipelineError::Transform)
    }

    fn finish(&self, asset_id: &AssetId, outcome: &Outcome, duration: Duration) {
        self.metrics.record_outcome(&outcome.label());
        let duration_ms = duration.as_millis() as u64;

        match outcome {
            Outcome::Completed { digest } => {
                info!(asset_id = %asset_id, digest = %digest, duration_ms, "Run completed");
            }
            Outcome::Skipped(reason) => {
                debug!(asset_id = %asset_id, reason = %reason, duration_ms, "Run skipped");
            }
            Outcome::Failed(e) => {
                error!(
                    asset_id = %asset_id,
                    kind = e.kind(),
                    transient = e.is_transient(),
                    error = %e,
                    duration_ms,
                    "Run failed"
                );
                if !self.retry.allows_retry(e) {
                    debug!(asset_id = %asset_id, "Retry policy forbids retry; asset left unmarked");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
