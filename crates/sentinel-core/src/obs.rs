//! Structured lifecycle events for dispatch, deployment and rollback.
//!
//! Each `emit_*` function logs one `info!` (or `warn!`) event carrying an
//! `event = "..."` field, so JSON log pipelines can filter on it.
//! Credentials never reach these functions.

use tracing::{info, warn};

/// Span scoped to one dispatched event. Attach it with
/// `tracing::Instrument` so it stays valid across `.await` points.
pub fn dispatch_span(event_type: &str, repository: &str) -> tracing::Span {
    tracing::info_span!(
        "sentinel.dispatch",
        event_type = %event_type,
        repository = %repository
    )
}

pub fn emit_dispatch_started(event_type: &str, repository: &str, matched: usize) {
    info!(
        event = "dispatch.started",
        event_type = %event_type,
        repository = %repository,
        matched = matched,
    );
}

pub fn emit_handler_skipped(handler: &str, condition: &str) {
    info!(event = "handler.skipped", handler = %handler, condition = %condition);
}

pub fn emit_handler_finished(handler: &str, duration_ms: u64, success: bool) {
    info!(
        event = "handler.finished",
        handler = %handler,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_handler_failed(handler: &str, error: &dyn std::fmt::Display) {
    warn!(event = "handler.failed", handler = %handler, error = %error);
}

pub fn emit_dispatch_finished(event_type: &str, results: usize, failures: usize) {
    info!(
        event = "dispatch.finished",
        event_type = %event_type,
        results = results,
        failures = failures,
    );
}

pub fn emit_repository_registered(repository: &str, selected_by: Option<&str>) {
    info!(
        event = "repository.registered",
        repository = %repository,
        selected_by = selected_by.unwrap_or("-"),
    );
}

pub fn emit_deployment_step(deployment_id: &str, step: &str, phase: &str) {
    info!(
        event = "deployment.step",
        deployment_id = %deployment_id,
        step = %step,
        phase = %phase,
    );
}

pub fn emit_deployment_finished(deployment_id: &str, status: &str) {
    info!(event = "deployment.finished", deployment_id = %deployment_id, status = %status);
}

pub fn emit_rollback_proposed(repository: &str, target: u32, pull_request: u64) {
    info!(
        event = "rollback.proposed",
        repository = %repository,
        rollback_number = target,
        pull_request = pull_request,
    );
}

pub fn emit_rollback_fallback(repository: &str, target: u32, reason: &str) {
    warn!(
        event = "rollback.fallback",
        repository = %repository,
        rollback_number = target,
        reason = %reason,
    );
}

pub fn emit_advisory_unavailable(repository: &str, reason: &str) {
    warn!(event = "advisory.unavailable", repository = %repository, reason = %reason);
}
