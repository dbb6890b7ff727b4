//! Domain models for wsbuild.
//!
//! - `Flavor`, `FlavorToken`, `FlavorSet`: which image variants a run processes
//! - `BuildRequest`, `BuiltImage`: the build phase's input and output
//! - `TestSession`, `ReleaseRequest`: records for the test and release phases
//! - `WsbuildError`, `RuntimeError`: the error taxonomy

pub mod error;
pub mod flavor;
pub mod phase;
pub mod request;

pub use error::{Result, RuntimeError, WsbuildError};
pub use flavor::{Flavor, FlavorSet, FlavorToken, COMPONENT_NAME};
pub use phase::{Phase, PhaseStatus};
pub use request::{
    format_build_date, BuildArgs, BuildRequest, BuiltImage, ReleaseRequest, TestSession,
    UNKNOWN_REVISION, WORKSPACE_TEST_PORT,
};
