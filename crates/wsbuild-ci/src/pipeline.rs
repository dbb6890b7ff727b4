//! Flavor pipeline orchestration.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, Instrument};
use uuid::Uuid;
use wsbuild_core::{
    emit_phase_finished, emit_phase_skipped, emit_phase_started, emit_pipeline_finished,
    flavor_span, BuildTool, BuiltImage, ContainerRuntime, FailurePolicy, Flavor, FlavorSet,
    FlavorToken, GitRevision, GitTagVersions, ImageFacility, Phase, PhaseScope, PhaseStatus,
    PipelineConfig, RevisionSource, VersionSource,
};

use crate::build_tool::ScriptBuildTool;
use crate::builder::ImageBuilder;
use crate::docker::DockerCli;
use crate::release::ReleasePropagator;
use crate::report::{FlavorFailure, FlavorReport, PipelineReport};
use crate::session::EphemeralTestSession;

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub build_tool: Arc<dyn BuildTool>,
    pub images: Arc<dyn ImageFacility>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub revision: Arc<dyn RevisionSource>,
    pub versions: Arc<dyn VersionSource>,
}

impl Collaborators {
    /// Docker CLI, per-step build scripts and git, rooted at the project root.
    pub fn system(config: &PipelineConfig) -> Self {
        let docker = Arc::new(DockerCli::new(config.root()));
        Self {
            build_tool: Arc::new(ScriptBuildTool::new()),
            images: docker.clone(),
            runtime: docker,
            revision: Arc::new(GitRevision::new(config.root())),
            versions: Arc::new(GitTagVersions::new(config.root())),
        }
    }
}

type PhaseResult<T> = std::result::Result<T, FlavorFailure>;

/// Top-level driver: build, then test, then release, flavor by flavor.
pub struct FlavorOrchestrator {
    deps: Collaborators,
}

impl FlavorOrchestrator {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    /// Run the pipeline for the requested flavors.
    ///
    /// Fatal outcomes are collected in the report rather than returned as
    /// errors; `PipelineReport::exit_code` maps them to the process status.
    pub async fn run(&self, token: FlavorToken, config: &PipelineConfig) -> PipelineReport {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let flavors = token.expand();
        info!(
            run_id = %run_id,
            requested = %token,
            flavors = flavors.len(),
            version = %config.version,
            "Starting flavor pipeline"
        );

        let mut report = PipelineReport::new(
            run_id.clone(),
            token,
            config.phase_scope,
            config.failure_policy,
        );
        match config.phase_scope {
            PhaseScope::PerFlavor => self.run_per_flavor(&flavors, config, &mut report).await,
            PhaseScope::LastFlavor => self.run_last_flavor(&flavors, config, &mut report).await,
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        emit_pipeline_finished(
            &run_id,
            report.flavors.len(),
            report.duration_ms,
            report.success(),
        );
        report
    }

    async fn run_per_flavor(
        &self,
        flavors: &FlavorSet,
        config: &PipelineConfig,
        report: &mut PipelineReport,
    ) {
        for &flavor in flavors {
            let mut flavor_report = FlavorReport::new(flavor);
            let result = self
                .process_flavor(flavor, config, &mut flavor_report)
                .instrument(flavor_span(&report.run_id, flavor))
                .await;
            report.flavors.push(flavor_report);

            if let Err(failure) = result {
                report.failures.push(failure);
                if config.failure_policy == FailurePolicy::AbortRun {
                    break;
                }
            }
        }
    }

    async fn process_flavor(
        &self,
        flavor: Flavor,
        config: &PipelineConfig,
        flavor_report: &mut FlavorReport,
    ) -> PhaseResult<()> {
        let image = self.build_phase(flavor, config, flavor_report).await?;
        self.test_phase(&image, config, flavor_report).await?;
        self.release_phase(&image, config, flavor_report).await
    }

    /// Build every flavor, then test and release only the last one built.
    async fn run_last_flavor(
        &self,
        flavors: &FlavorSet,
        config: &PipelineConfig,
        report: &mut PipelineReport,
    ) {
        let mut last_built: Option<BuiltImage> = None;
        for &flavor in flavors {
            let mut flavor_report = FlavorReport::new(flavor);
            let result = self
                .build_phase(flavor, config, &mut flavor_report)
                .instrument(flavor_span(&report.run_id, flavor))
                .await;
            report.flavors.push(flavor_report);

            match result {
                Ok(image) => last_built = Some(image),
                Err(failure) => {
                    last_built = None;
                    report.failures.push(failure);
                    if config.failure_policy == FailurePolicy::AbortRun {
                        return;
                    }
                }
            }
        }

        let Some(image) = last_built else {
            return;
        };
        let Some(flavor_report) = report.flavors.last_mut() else {
            return;
        };
        let span = flavor_span(&report.run_id, image.flavor);
        let result = async {
            self.test_phase(&image, config, flavor_report).await?;
            self.release_phase(&image, config, flavor_report).await
        }
        .instrument(span)
        .await;
        if let Err(failure) = result {
            report.failures.push(failure);
        }
    }

    async fn build_phase(
        &self,
        flavor: Flavor,
        config: &PipelineConfig,
        flavor_report: &mut FlavorReport,
    ) -> PhaseResult<BuiltImage> {
        emit_phase_started(flavor, Phase::Build);
        let start = Instant::now();
        let builder = ImageBuilder::new(
            self.deps.build_tool.as_ref(),
            self.deps.images.as_ref(),
            self.deps.revision.as_ref(),
        );
        let result = builder.build(flavor, config).await;
        let ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(image) => {
                finish(flavor_report, Phase::Build, ms, true);
                flavor_report.image = Some(image.clone());
                Ok(image)
            }
            Err(e) => {
                finish(flavor_report, Phase::Build, ms, false);
                Err(fail(flavor, Phase::Build, &e))
            }
        }
    }

    async fn test_phase(
        &self,
        image: &BuiltImage,
        config: &PipelineConfig,
        flavor_report: &mut FlavorReport,
    ) -> PhaseResult<()> {
        if !config.phases.test {
            skip(flavor_report, image.flavor, Phase::Test, "test disabled");
            return Ok(());
        }

        emit_phase_started(image.flavor, Phase::Test);
        let start = Instant::now();
        let outcome = EphemeralTestSession::new(self.deps.runtime.as_ref())
            .run(image, config)
            .await;
        let ms = start.elapsed().as_millis() as u64;

        flavor_report.test_session = Some(outcome.session.clone());
        flavor_report.cleanup = Some(outcome.cleanup.clone());
        match outcome.into_result() {
            Ok(_) => {
                finish(flavor_report, Phase::Test, ms, true);
                Ok(())
            }
            Err(e) => {
                finish(flavor_report, Phase::Test, ms, false);
                Err(fail(image.flavor, Phase::Test, &e))
            }
        }
    }

    async fn release_phase(
        &self,
        image: &BuiltImage,
        config: &PipelineConfig,
        flavor_report: &mut FlavorReport,
    ) -> PhaseResult<()> {
        if !config.phases.release {
            skip(flavor_report, image.flavor, Phase::Release, "release disabled");
            return Ok(());
        }

        emit_phase_started(image.flavor, Phase::Release);
        let start = Instant::now();
        let result = ReleasePropagator::new(self.deps.images.as_ref(), self.deps.versions.as_ref())
            .release(image, config)
            .await;
        let ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(release) => {
                finish(flavor_report, Phase::Release, ms, true);
                flavor_report.release = Some(release);
                Ok(())
            }
            Err(e) => {
                finish(flavor_report, Phase::Release, ms, false);
                Err(fail(image.flavor, Phase::Release, &e))
            }
        }
    }
}

fn finish(flavor_report: &mut FlavorReport, phase: Phase, duration_ms: u64, success: bool) {
    let status = if success {
        PhaseStatus::Passed
    } else {
        PhaseStatus::Failed
    };
    flavor_report.record(phase, status, duration_ms);
    emit_phase_finished(flavor_report.flavor, phase, duration_ms, success);
}

fn skip(flavor_report: &mut FlavorReport, flavor: Flavor, phase: Phase, reason: &str) {
    flavor_report.record(phase, PhaseStatus::Skipped, 0);
    emit_phase_skipped(flavor, phase, reason);
}

fn fail(flavor: Flavor, phase: Phase, err: &wsbuild_core::WsbuildError) -> FlavorFailure {
    let failure = FlavorFailure::from_error(flavor, phase, err);
    if failure.expected {
        error!(flavor = %flavor, phase = %failure.phase, error = %err, "Phase failed");
    } else {
        error!(
            flavor = %flavor,
            phase = %failure.phase,
            error = %err,
            retryable = failure.retryable,
            "Phase failed unexpectedly"
        );
    }
    if let Some(logs) = &failure.container_logs {
        error!(flavor = %flavor, "Container logs:\n{logs}");
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbuild_core::fakes::{
        RecordingBuildTool, RecordingImageFacility, ScriptedContainerRuntime, StaticRevision,
        StaticVersionSource,
    };

    #[tokio::test]
    async fn test_disabled_phases_are_recorded_as_skipped() {
        let deps = Collaborators {
            build_tool: Arc::new(RecordingBuildTool::new()),
            images: Arc::new(RecordingImageFacility::new()),
            runtime: Arc::new(ScriptedContainerRuntime::new()),
            revision: Arc::new(StaticRevision::new(Some("abc1234"))),
            versions: Arc::new(StaticVersionSource::new(None)),
        };
        let config = PipelineConfig::new("1.3.0")
            .unwrap()
            .with_phases(true, false, false);

        let report = FlavorOrchestrator::new(deps)
            .run(FlavorToken::Single(Flavor::Light), &config)
            .await;

        let light = report.flavor(Flavor::Light).expect("light report");
        assert_eq!(light.status(Phase::Build), Some(PhaseStatus::Passed));
        assert_eq!(light.status(Phase::Test), Some(PhaseStatus::Skipped));
        assert_eq!(light.status(Phase::Release), Some(PhaseStatus::Skipped));
        assert!(report.success());
        assert!(!report.run_id.is_empty());
    }
}
