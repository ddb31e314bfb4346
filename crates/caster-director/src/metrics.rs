//! Prometheus metrics for the director.

use std::net::SocketAddr;

use caster_models::{PriorityClass, SessionState};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{DirectorError, DirectorResult};

/// Install the Prometheus recorder with an HTTP scrape endpoint.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> DirectorResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DirectorError::config_error(format!("metrics exporter: {e}")))
}

/// Metric names as constants for consistency.
pub mod names {
    // Tick loop
    pub const TICKS_TOTAL: &str = "caster_ticks_total";
    pub const TICK_FAILURES_TOTAL: &str = "caster_tick_failures_total";
    pub const TICK_DURATION_SECONDS: &str = "caster_tick_duration_seconds";

    // Decisions
    pub const VIEW_CHANGES_TOTAL: &str = "caster_view_changes_total";
    pub const STATE_TRANSITIONS_TOTAL: &str = "caster_state_transitions_total";
    pub const CONFLICTS_ACTIVE: &str = "caster_conflicts_active";

    // Capture
    pub const CAPTURE_FAILURES_TOTAL: &str = "caster_capture_failures_total";
}

/// Record a completed tick.
pub fn record_tick(duration_secs: f64) {
    counter!(names::TICKS_TOTAL).increment(1);
    histogram!(names::TICK_DURATION_SECONDS).record(duration_secs);
}

/// Record a tick that ended in an error.
pub fn record_tick_failure() {
    counter!(names::TICK_FAILURES_TOTAL).increment(1);
}

/// Record a camera move to a new target.
pub fn record_view_change(class: PriorityClass) {
    let labels = [("class", class.as_str().to_string())];
    counter!(names::VIEW_CHANGES_TOTAL, &labels).increment(1);
}

/// Record a session state transition.
pub fn record_state_transition(from: SessionState, to: SessionState) {
    let labels = [
        ("from", from.as_str().to_string()),
        ("to", to.as_str().to_string()),
    ];
    counter!(names::STATE_TRANSITIONS_TOTAL, &labels).increment(1);
}

/// Update the active conflicts gauge.
pub fn set_active_conflicts(count: usize) {
    gauge!(names::CONFLICTS_ACTIVE).set(count as f64);
}

/// Record a capture that failed or timed out.
pub fn record_capture_failure() {
    counter!(names::CAPTURE_FAILURES_TOTAL).increment(1);
}
