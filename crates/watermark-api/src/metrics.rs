//! Metrics recorded by the HTTP layer.

use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Arc;
use watermark_core::AckStatus;

/// Service metrics for observability
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    /// Trigger requests by acknowledgement status
    pub webhook_requests_total: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry) -> Result<Arc<Self>, prometheus::Error> {
        let webhook_requests_total = IntCounterVec::new(
            Opts::new(
                "webhook_requests_total",
                "Trigger requests by acknowledgement status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(webhook_requests_total.clone()))?;

        Ok(Arc::new(Self {
            webhook_requests_total,
        }))
    }

    pub fn record_request(&self, status: AckStatus) {
        let label = match status {
            AckStatus::Accepted => "accepted",
            AckStatus::Skipped => "skipped",
            AckStatus::Error => "error",
        };
        self.webhook_requests_total.with_label_values(&[label]).inc();
    }
}
