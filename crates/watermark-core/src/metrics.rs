//! Prometheus metrics recorded by the pipeline.
//!
//! Metrics are registered into a caller-supplied [`Registry`] rather than the
//! process-global one, so any number of pipelines can coexist in one process.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline metrics
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    /// Terminal outcomes of pipeline runs
    pub runs_total: IntCounterVec,

    /// Wall-clock time of the render step
    pub render_duration_seconds: Histogram,
}

impl PipelineMetrics {
    /// Create the metrics and register them into `registry`
    pub fn new(registry: &Registry) -> Result<Arc<Self>, prometheus::Error> {
        let runs_total = IntCounterVec::new(
            Opts::new("watermark_runs_total", "Pipeline runs by terminal outcome"),
            &["outcome"],
        )?;
        let render_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "watermark_render_duration_seconds",
                "Time spent rendering the watermark",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(render_duration_seconds.clone()))?;

        Ok(Arc::new(Self {
            runs_total,
            render_duration_seconds,
        }))
    }

    /// Metrics registered into a private registry
    pub fn unregistered() -> Result<Arc<Self>, prometheus::Error> {
        Self::new(&Registry::new())
    }

    /// Count a finished run
    pub fn record_outcome(&self, outcome_label: &str) {
        self.runs_total.with_label_values(&[outcome_label]).inc();
    }

    /// Observe a render duration
    pub fn observe_render(&self, duration: Duration) {
        self.render_duration_seconds.observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
