//! Structured lifecycle events for pipeline runs.
//!
//! - Flavor-scoped tracing spans via `flavor_span`, meant for
//!   `tracing::Instrument` since phases await across the span
//! - Emission functions for phase start/finish/skip, cleanup failures and
//!   the end of a run
//!
//! Events are emitted at `info!` level except failures, which use `warn!`
//! or `error!`.

use tracing::{error, info, warn};

use crate::domain::{Flavor, Phase};

/// Span tagged with the run id and flavor.
pub fn flavor_span(run_id: &str, flavor: Flavor) -> tracing::Span {
    tracing::info_span!("wsbuild.flavor", run_id = %run_id, flavor = %flavor)
}

/// Emit event: a phase started for a flavor.
pub fn emit_phase_started(flavor: Flavor, phase: Phase) {
    info!(event = "phase.started", flavor = %flavor, phase = %phase);
}

/// Emit event: a phase finished.
pub fn emit_phase_finished(flavor: Flavor, phase: Phase, duration_ms: u64, success: bool) {
    if success {
        info!(
            event = "phase.finished",
            flavor = %flavor,
            phase = %phase,
            duration_ms = duration_ms,
            success = success,
        );
    } else {
        error!(
            event = "phase.finished",
            flavor = %flavor,
            phase = %phase,
            duration_ms = duration_ms,
            success = success,
        );
    }
}

/// Emit event: a phase was not run.
pub fn emit_phase_skipped(flavor: Flavor, phase: Phase, reason: &str) {
    info!(event = "phase.skipped", flavor = %flavor, phase = %phase, reason = %reason);
}

/// Emit event: test container removal failed (warning level).
pub fn emit_cleanup_failed(container: &str, error: &dyn std::fmt::Display) {
    warn!(event = "session.cleanup_failed", container = %container, error = %error);
}

/// Emit event: pipeline finished.
pub fn emit_pipeline_finished(run_id: &str, flavors: usize, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        flavors = flavors,
        duration_ms = duration_ms,
        success = success,
    );
}
