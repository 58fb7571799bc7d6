// Prometheus metrics for the grading API
use codegrade_common::types::Evaluation;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use tracing::warn;

pub const INTERNAL_ERROR: &str = "internal_error";

lazy_static! {
    pub static ref EVALUATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codegrade_evaluations_total",
        "Evaluations by verdict",
        &["verdict"]
    )
    .expect("codegrade_evaluations_total is registered once");
    pub static ref TEST_CASES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codegrade_test_cases_total",
        "Executed test cases by status",
        &["status"]
    )
    .expect("codegrade_test_cases_total is registered once");
    pub static ref EVALUATION_DURATION: Histogram = register_histogram!(
        "codegrade_evaluation_duration_seconds",
        "Wall-clock time of one evaluation request",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("codegrade_evaluation_duration_seconds is registered once");
}

pub fn record_evaluation(evaluation: &Evaluation, seconds: f64) {
    EVALUATIONS_TOTAL
        .with_label_values(&[evaluation.outcome().as_str()])
        .inc();
    if let Some(report) = evaluation.report() {
        for outcome in &report.outcomes {
            TEST_CASES_TOTAL
                .with_label_values(&[outcome.status.as_str()])
                .inc();
        }
    }
    EVALUATION_DURATION.observe(seconds);
}

pub fn record_internal_error(seconds: f64) {
    EVALUATIONS_TOTAL.with_label_values(&[INTERNAL_ERROR]).inc();
    EVALUATION_DURATION.observe(seconds);
}

/// Everything in the default registry, in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
