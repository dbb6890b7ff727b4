//! Run reports: per-flavor phase records and phase-labeled failures.

use std::path::Path;

use serde::{Deserialize, Serialize};
use wsbuild_core::{
    BuiltImage, FailurePolicy, Flavor, FlavorToken, Phase, PhaseScope, PhaseStatus, Result,
    TestSession, WsbuildError,
};

use crate::release::ReleaseReport;
use crate::session::CleanupOutcome;

/// One phase execution for one flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration_ms: u64,
}

/// A fatal outcome, labeled with the flavor and the phase it hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorFailure {
    pub flavor: Flavor,
    pub phase: Phase,
    pub message: String,

    /// Missing image or non-zero exit, as opposed to a collaborator crash.
    pub expected: bool,
    pub retryable: bool,
    pub container_logs: Option<String>,
}

impl FlavorFailure {
    /// Label `err`; `phase` is used when the error carries no phase of its own.
    pub fn from_error(flavor: Flavor, phase: Phase, err: &WsbuildError) -> Self {
        Self {
            flavor,
            phase: err.phase().unwrap_or(phase),
            message: err.to_string(),
            expected: err.is_expected(),
            retryable: err.is_retryable(),
            container_logs: err.container_logs().map(str::to_string),
        }
    }

    /// One-line diagnostic naming the flavor and the failing phase.
    pub fn diagnostic(&self) -> String {
        format!(
            "{} phase failed for {} flavor: {}",
            self.phase, self.flavor, self.message
        )
    }
}

/// Everything that happened to one flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorReport {
    pub flavor: Flavor,
    pub image: Option<BuiltImage>,
    pub phases: Vec<PhaseRecord>,
    pub test_session: Option<TestSession>,
    pub cleanup: Option<CleanupOutcome>,
    pub release: Option<ReleaseReport>,
}

impl FlavorReport {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            image: None,
            phases: Vec::new(),
            test_session: None,
            cleanup: None,
            release: None,
        }
    }

    pub fn record(&mut self, phase: Phase, status: PhaseStatus, duration_ms: u64) {
        self.phases.push(PhaseRecord {
            phase,
            status,
            duration_ms,
        });
    }

    /// Status of `phase`, if it was reached.
    pub fn status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| r.status)
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub requested: FlavorToken,
    pub phase_scope: PhaseScope,
    pub failure_policy: FailurePolicy,
    pub flavors: Vec<FlavorReport>,
    pub failures: Vec<FlavorFailure>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn new(
        run_id: String,
        requested: FlavorToken,
        phase_scope: PhaseScope,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            run_id,
            requested,
            phase_scope,
            failure_policy,
            flavors: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Whether no fatal outcome occurred.
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// The fatal outcome that ended (or first marked) the run.
    pub fn first_failure(&self) -> Option<&FlavorFailure> {
        self.failures.first()
    }

    pub fn flavor(&self, flavor: Flavor) -> Option<&FlavorReport> {
        self.flavors.iter().find(|r| r.flavor == flavor)
    }

    /// Number of flavors whose `phase` ended with `status`.
    pub fn count(&self, phase: Phase, status: PhaseStatus) -> usize {
        self.flavors
            .iter()
            .filter(|r| r.status(phase) == Some(status))
            .count()
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
