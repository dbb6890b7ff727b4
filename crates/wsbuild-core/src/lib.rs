//! wsbuild Core Library
//!
//! Domain model, configuration, collaborator contracts and git/file helpers
//! for the ml-workspace flavor pipeline.

pub mod config;
pub mod domain;
pub mod facilities;
pub mod fakes;
pub mod files;
pub mod git;
pub mod obs;
pub mod telemetry;
pub mod version;

pub use config::{
    is_stable_version, validate_version, FailurePolicy, PhaseScope, PhaseToggles,
    PipelineConfig, DEFAULT_IMAGE_PREFIX, DEFAULT_TEST_COMMAND, VERSION_FILES,
};

pub use domain::{
    format_build_date, BuildArgs, BuildRequest, BuiltImage, Flavor, FlavorSet, FlavorToken,
    Phase, PhaseStatus, ReleaseRequest, Result, RuntimeError, TestSession, WsbuildError,
    COMPONENT_NAME, UNKNOWN_REVISION, WORKSPACE_TEST_PORT,
};

pub use facilities::{
    BuildTool, ContainerDetails, ContainerRuntime, ImageFacility, RevisionSource,
    RuntimeResult, VersionSource,
};

pub use files::{rewrite_version_in_files, FileRewrite};
pub use git::{capture_head_revision, resolve_revision, GitRevision};
pub use obs::{
    emit_cleanup_failed, emit_phase_finished, emit_phase_skipped, emit_phase_started,
    emit_pipeline_finished, flavor_span,
};
pub use telemetry::init_tracing;
pub use version::{
    describe_latest_tag, normalize_tag, resolve_versions, GitTagVersions, ResolvedVersions,
};

/// wsbuild version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
