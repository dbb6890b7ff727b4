//! wsbuild CI - flavor pipeline for ml-workspace images
//!
//! Provides the orchestrator that:
//! - Runs the per-flavor build step and docker image build
//! - Tests each image inside a disposable container
//! - Propagates the release version into files and publishes the image

pub mod build_tool;
pub mod builder;
pub mod docker;
pub mod pipeline;
pub mod release;
pub mod report;
pub mod runner;
pub mod session;

// Re-export key types
pub use build_tool::{ScriptBuildTool, BUILD_SCRIPT};
pub use builder::ImageBuilder;
pub use docker::DockerCli;
pub use pipeline::{Collaborators, FlavorOrchestrator};
pub use release::{ReleasePropagator, ReleaseReport};
pub use report::{FlavorFailure, FlavorReport, PhaseRecord, PipelineReport};
pub use runner::{CommandOutput, CommandRunner, CommandSpec};
pub use session::{CleanupOutcome, EphemeralTestSession, SessionOutcome};
