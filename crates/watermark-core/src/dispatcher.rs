//! # Dispatcher
//!
//! Accepts a raw trigger, normalizes it, and hands the asset to a detached
//! pipeline run. The caller gets its acknowledgement as soon as
//! normalization finishes; the run's result is only observable through the
//! returned join handle, logs and metrics.

use crate::pipeline::{Pipeline, RunReport, SkipReason};
use crate::trigger::{self, Resolution, TriggerConfig, TriggerError};
use crate::AssetId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Acknowledgement status returned to the trigger caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Accepted,
    Skipped,
    Error,
}

/// Body of the fast response to a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub status: AckStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Acknowledgement {
    pub fn accepted(asset_id: &AssetId) -> Self {
        Self {
            status: AckStatus::Accepted,
            asset_id: Some(asset_id.to_string()),
            reason: None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: AckStatus::Skipped,
            asset_id: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            asset_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Result of accepting a trigger
#[derive(Debug)]
pub struct Acceptance {
    pub acknowledgement: Acknowledgement,

    /// Handle of the detached run, when one was started
    pub run: Option<JoinHandle<RunReport>>,
}

/// Trigger intake in front of the pipeline
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    triggers: TriggerConfig,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>, triggers: TriggerConfig) -> Self {
        Self { pipeline, triggers }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Normalize `payload` and start a detached run for its asset
    ///
    /// Errors are limited to normalization: a malformed payload or a failed
    /// lookup of the referencing record. Nothing after normalization can fail
    /// the acknowledgement.
    pub async fn accept(&self, payload: &Value) -> Result<Acceptance, TriggerError> {
        let resolution =
            trigger::resolve(payload, &self.triggers, self.pipeline.store().as_ref()).await?;

        match resolution {
            Resolution::Skip { detail } => {
                debug!(detail = %detail, "Trigger designates no asset");
                self.pipeline
                    .record_skip_without_run(SkipReason::NoIdentifier);
                Ok(Acceptance {
                    acknowledgement: Acknowledgement::skipped(SkipReason::NoIdentifier),
                    run: None,
                })
            }
            Resolution::Asset(asset_id) => {
                info!(asset_id = %asset_id, "Trigger accepted");
                let acknowledgement = Acknowledgement::accepted(&asset_id);
                let pipeline = Arc::clone(&self.pipeline);
                let run = tokio::spawn(async move { pipeline.run(asset_id).await });

                Ok(Acceptance {
                    acknowledgement,
                    run: Some(run),
                })
            }
        }
    }

    /// Whether the lock store answers
    pub async fn is_ready(&self) -> bool {
        self.pipeline.lock().is_reachable().await
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
