//! Contracts of the external collaborators the pipeline drives.
//!
//! - `BuildTool`: flavor-specific pre-build preparation
//! - `ImageFacility`: `docker build` and registry publishing
//! - `ContainerRuntime`: lifecycle of the ephemeral test container
//! - `RevisionSource` / `VersionSource`: git metadata
//!
//! All traits are async and object-safe. Recording fakes live in the
//! `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::domain::{BuildArgs, Result, RuntimeError};

/// Runtime facility result.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Flavor-specific pre-build work, opaque to the pipeline.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Run the named build step. Any error is a fatal build failure.
    async fn build(&self, step: &str, config: &PipelineConfig) -> Result<()>;
}

/// Container image build and publish facility.
#[async_trait]
pub trait ImageFacility: Send + Sync {
    /// Build `name:version` with the given build arguments; returns the exit status.
    async fn build_image(&self, name: &str, version: &str, build_args: &BuildArgs) -> Result<i32>;

    /// Tag `name:version` under `prefix` and push it; returns the exit status.
    async fn release_image(&self, name: &str, version: &str, prefix: &str) -> Result<i32>;
}

/// Network attributes of a container, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: Option<String>,
    pub state: Option<String>,

    /// IP address on the default bridge network, if one is assigned.
    pub bridge_ip: Option<String>,
}

impl ContainerDetails {
    /// Extract details from one `docker inspect` object.
    ///
    /// An empty `IPAddress` string is treated as unassigned.
    pub fn from_inspect(value: &Value) -> Self {
        let bridge_ip = value
            .pointer("/NetworkSettings/Networks/bridge/IPAddress")
            .and_then(Value::as_str)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);
        Self {
            id: value.get("Id").and_then(Value::as_str).map(str::to_string),
            state: value
                .pointer("/State/Status")
                .and_then(Value::as_str)
                .map(str::to_string),
            bridge_ip,
        }
    }
}

/// Container runtime client used by the test session.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container named `name` from `image_ref`. The container
    /// is not removed automatically on exit.
    async fn run_detached(
        &self,
        image_ref: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> RuntimeResult<()>;

    /// Refresh and return the container's current attributes.
    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails>;

    /// Execute `command` inside the container; returns its exit status.
    async fn exec(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
        command: &[String],
    ) -> RuntimeResult<i32>;

    /// Remove the container.
    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<()>;

    /// Fetch the container's logs.
    async fn logs(&self, name: &str) -> RuntimeResult<String>;
}

/// Source of the current source revision.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn head_revision(&self) -> Result<String>;
}

/// Source of the previously published version.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// The latest published version, or `None` if nothing was released yet.
    async fn latest_version(&self) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_details_from_inspect_with_bridge_ip() {
        let value = json!({
            "Id": "4f2a",
            "State": { "Status": "running" },
            "NetworkSettings": { "Networks": { "bridge": { "IPAddress": "172.17.0.3" } } }
        });
        let details = ContainerDetails::from_inspect(&value);
        assert_eq!(details.id.as_deref(), Some("4f2a"));
        assert_eq!(details.state.as_deref(), Some("running"));
        assert_eq!(details.bridge_ip.as_deref(), Some("172.17.0.3"));
    }

    #[test]
    fn test_details_empty_ip_is_unassigned() {
        let value = json!({
            "NetworkSettings": { "Networks": { "bridge": { "IPAddress": "" } } }
        });
        assert!(ContainerDetails::from_inspect(&value).bridge_ip.is_none());
    }

    #[test]
    fn test_details_missing_network_section() {
        let value = json!({ "Id": "abc" });
        let details = ContainerDetails::from_inspect(&value);
        assert!(details.bridge_ip.is_none());
        assert!(details.state.is_none());
    }
}
