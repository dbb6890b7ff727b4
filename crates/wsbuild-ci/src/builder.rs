//! Image build phase for a single flavor.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use wsbuild_core::{
    resolve_revision, BuildRequest, BuildTool, BuiltImage, Flavor, ImageFacility,
    PipelineConfig, Result, RevisionSource, WsbuildError,
};

/// Runs the build-tool step and, when make is enabled, the image build.
pub struct ImageBuilder<'a> {
    tool: &'a dyn BuildTool,
    images: &'a dyn ImageFacility,
    revision: &'a dyn RevisionSource,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(
        tool: &'a dyn BuildTool,
        images: &'a dyn ImageFacility,
        revision: &'a dyn RevisionSource,
    ) -> Self {
        Self {
            tool,
            images,
            revision,
        }
    }

    /// Build a flavor, stamping the image with the current UTC time.
    pub async fn build(&self, flavor: Flavor, config: &PipelineConfig) -> Result<BuiltImage> {
        self.build_at(flavor, config, Utc::now()).await
    }

    /// Build a flavor with a fixed build timestamp (used for deterministic tests).
    ///
    /// Every failure is reported as `WsbuildError::BuildFailed`.
    pub async fn build_at(
        &self,
        flavor: Flavor,
        config: &PipelineConfig,
        built_at: DateTime<Utc>,
    ) -> Result<BuiltImage> {
        let step = flavor.build_step();
        info!(flavor = %flavor, step = %step, "Running build step");
        self.tool
            .build(&step, config)
            .await
            .map_err(|e| build_failed(flavor, e))?;

        if !config.phases.make {
            return Ok(BuiltImage {
                flavor,
                name: flavor.image_name(),
                version: config.version.clone(),
                materialized: false,
            });
        }

        let git_revision = resolve_revision(self.revision).await;
        let request = BuildRequest::new(flavor, config.version.as_str(), git_revision, built_at);
        let build_args = request.build_args();
        info!(
            flavor = %flavor,
            image = %request.image_name,
            version = %request.version,
            build_args = %build_args,
            "Making docker image"
        );

        let status = self
            .images
            .build_image(&request.image_name, &request.version, &build_args)
            .await
            .map_err(|e| build_failed(flavor, e))?;
        if status != 0 {
            warn!(flavor = %flavor, status, "Docker image build failed");
            return Err(WsbuildError::BuildFailed {
                flavor,
                exit_code: Some(status),
                reason: format!("docker image build exited with return code {status}"),
            });
        }

        Ok(BuiltImage {
            flavor,
            name: request.image_name,
            version: request.version,
            materialized: true,
        })
    }
}

fn build_failed(flavor: Flavor, e: WsbuildError) -> WsbuildError {
    match e {
        WsbuildError::BuildFailed { .. } => e,
        WsbuildError::BuildStepFailed {
            exit_code, reason, ..
        } => WsbuildError::BuildFailed {
            flavor,
            exit_code,
            reason,
        },
        other => WsbuildError::BuildFailed {
            flavor,
            exit_code: None,
            reason: other.to_string(),
        },
    }
}
