use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EVENTS_PROCESSED: &str = "fraudgate_events_processed_total";
pub const EVENTS_FAILED: &str = "fraudgate_events_failed_total";
pub const EVENTS_DEAD_LETTERED: &str = "fraudgate_events_dead_lettered_total";
pub const ALERTS: &str = "fraudgate_alerts_total";
pub const CASES_OPENED: &str = "fraudgate_cases_opened_total";
pub const CREDIT_BLOCKS: &str = "fraudgate_credit_blocks_total";
pub const POLICY_RELOADS: &str = "fraudgate_policy_reloads_total";

/// Install the global Prometheus recorder.
///
/// The returned handle renders the exposition text for `GET /metrics`.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(EVENTS_PROCESSED, "Transaction events fully processed");
    describe_counter!(EVENTS_FAILED, "Transaction event processing failures");
    describe_counter!(EVENTS_DEAD_LETTERED, "Events dropped after exhausting delivery attempts");
    describe_counter!(ALERTS, "Fraud alerts raised");
    describe_counter!(CASES_OPENED, "Fraud cases opened");
    describe_counter!(CREDIT_BLOCKS, "Credit blocks applied");
    describe_counter!(POLICY_RELOADS, "Policy reload attempts");
}

/// Lowercase and replace spaces so free-text reasons are usable as labels.
pub fn sanitize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    trimmed.replace(' ', "_").to_lowercase()
}

pub fn record_event_processed() {
    counter!(EVENTS_PROCESSED).increment(1);
}

pub fn record_event_failed() {
    counter!(EVENTS_FAILED).increment(1);
}

pub fn record_dead_letter() {
    counter!(EVENTS_DEAD_LETTERED).increment(1);
}

pub fn record_alert(alert_type: &str, severity: &str) {
    counter!(
        ALERTS,
        "type" => sanitize_label(alert_type),
        "severity" => sanitize_label(severity)
    )
    .increment(1);
}

pub fn record_case_opened(priority: &str) {
    counter!(CASES_OPENED, "priority" => sanitize_label(priority)).increment(1);
}

pub fn record_credit_block(reason: &str) {
    counter!(CREDIT_BLOCKS, "reason" => sanitize_label(reason)).increment(1);
}

pub fn record_policy_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(POLICY_RELOADS, "outcome" => outcome).increment(1);
}
