//! Structured observability hooks for planning.
//!
//! - `plan_span`: span tagging everything logged during a plan
//!   with its correlation key
//! - emitters for `plan.started`, `plan.finished` and `job.skipped`
//!
//! State transitions (`state.acquired`, `state.preempted`, `state.terminal`)
//! are emitted by `monoplan_state::ExecutionStateStore` itself.

use tracing::info;

/// Span tagging everything logged during a plan with its correlation key.
///
/// Attach it to the planning future with [`tracing::Instrument`] rather than
/// entering it, so it is never held across an `.await`.
pub fn plan_span(correlation_key: &str) -> tracing::Span {
    tracing::info_span!("monoplan.plan", correlation_key = %correlation_key)
}

/// Emit event: planning started.
pub fn emit_plan_started(correlation_key: &str, event_name: &str, apps: usize) {
    info!(
        event = "plan.started",
        correlation_key = %correlation_key,
        event_name = %event_name,
        apps = apps,
    );
}

/// Emit event: planning finished.
pub fn emit_plan_finished(correlation_key: &str, selected: usize, skipped: usize, duration_ms: u64) {
    info!(
        event = "plan.finished",
        correlation_key = %correlation_key,
        selected = selected,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

/// Emit event: a job was dropped from the plan.
pub fn emit_job_skipped(label: &str, reason: &dyn std::fmt::Display) {
    info!(event = "job.skipped", label = %label, reason = %reason, "{label}: skipped, {reason}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_span_wraps_lifecycle_events() {
        let _entered = plan_span("refs/heads/main").entered();
        emit_plan_started("refs/heads/main", "push", 3);
        emit_job_skipped("web / build", &"not affected");
    }
}
