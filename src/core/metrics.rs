use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Counts lifecycle transitions (accept, bind, reset, submit, grade).
pub(crate) fn lifecycle_event(event: &'static str) {
    metrics::counter!("lifecycle_events_total", "event" => event).increment(1);
}

pub(crate) fn completion_call(kind: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("completion_requests_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("completion_request_duration_seconds", "kind" => kind)
        .record(elapsed.as_secs_f64());
}

pub(crate) fn rate_limited(scope: &'static str) {
    metrics::counter!("rate_limited_requests_total", "scope" => scope).increment(1);
}
