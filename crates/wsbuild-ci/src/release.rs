//! Release phase: version propagation into files, then image publishing.

use serde::{Deserialize, Serialize};
use tracing::info;
use wsbuild_core::{
    resolve_versions, rewrite_version_in_files, BuiltImage, FileRewrite, ImageFacility,
    PipelineConfig, ReleaseRequest, Result, VersionSource, WsbuildError,
};

/// What a release step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub request: ReleaseRequest,
    pub rewrites: Vec<FileRewrite>,
    pub published: String,
}

/// Rewrites the previous version token and publishes the image.
pub struct ReleasePropagator<'a> {
    images: &'a dyn ImageFacility,
    versions: &'a dyn VersionSource,
}

impl<'a> ReleasePropagator<'a> {
    pub fn new(images: &'a dyn ImageFacility, versions: &'a dyn VersionSource) -> Self {
        Self { images, versions }
    }

    /// Release `image` under the configured registry prefix.
    ///
    /// A failed rewrite aborts before anything is published.
    pub async fn release(&self, image: &BuiltImage, config: &PipelineConfig) -> Result<ReleaseReport> {
        let versions = resolve_versions(config, self.versions)
            .await
            .map_err(|e| release_failed(image, None, format!("could not resolve versions: {e}")))?;

        let request = ReleaseRequest {
            previous_version: versions.previous,
            new_version: versions.current,
            files: config.version_files(),
            image_name: image.name.clone(),
            registry_prefix: config.docker_image_prefix.clone(),
        };

        let rewrites = match &request.previous_version {
            Some(previous) if request.needs_rewrite() => {
                info!(
                    from = %previous,
                    to = %request.new_version,
                    "Updating version in files"
                );
                rewrite_version_in_files(&request.files, previous, &request.new_version)?
            }
            Some(previous) => {
                info!(version = %previous, "Previous version matches, no files to update");
                Vec::new()
            }
            None => {
                info!("No previous version found to update in files");
                Vec::new()
            }
        };

        let status = self
            .images
            .release_image(&request.image_name, &request.new_version, &request.registry_prefix)
            .await
            .map_err(|e| release_failed(image, None, e.to_string()))?;
        if status != 0 {
            return Err(release_failed(
                image,
                Some(status),
                format!("publishing exited with return code {status}"),
            ));
        }

        let published = request.remote_reference();
        info!(image = %published, "Successfully released");
        Ok(ReleaseReport {
            request,
            rewrites,
            published,
        })
    }
}

fn release_failed(image: &BuiltImage, exit_code: Option<i32>, reason: String) -> WsbuildError {
    WsbuildError::ReleaseFailed {
        image: image.reference(),
        exit_code,
        reason,
    }
}
