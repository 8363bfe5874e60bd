use super::*;

#[test]
fn test_registers_into_supplied_registry() {
    let registry = Registry::new();
    let metrics = PipelineMetrics::new(&registry).unwrap();

    metrics.record_outcome("completed");
    metrics.observe_render(Duration::from_millis(120));

    let text = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(text.contains("watermark_runs_total{outcome=\"completed\"} 1"));
    assert!(text.contains("watermark_render_duration_seconds_count 1"));
}

#[test]
fn test_double_registration_is_rejected() {
    let registry = Registry::new();
    PipelineMetrics::new(&registry).unwrap();
    assert!(PipelineMetrics::new(&registry).is_err());
}

#[test]
fn test_independent_instances_do_not_conflict() {
    let a = PipelineMetrics::unregistered().unwrap();
    let b = PipelineMetrics::unregistered().unwrap();

    a.record_outcome("skipped_contention");
    a.record_outcome("skipped_contention");
    b.record_outcome("skipped_contention");

    assert_eq!(
        a.runs_total.with_label_values(&["skipped_contention"]).get(),
        2
    );
    assert_eq!(
        b.runs_total.with_label_values(&["skipped_contention"]).get(),
        1
    );
}
