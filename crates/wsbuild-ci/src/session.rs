//! Ephemeral test session: one disposable container per tested flavor.
//!
//! The session starts a detached container from the built image, resolves its
//! bridge address, runs the test command inside it with `docker exec`, and
//! removes the container. Removal happens exactly once per session on every
//! path, and its result never replaces the test outcome.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use wsbuild_core::{
    emit_cleanup_failed, BuiltImage, ContainerRuntime, PipelineConfig, Result, RuntimeError,
    TestSession, WsbuildError,
};

/// Outcome of removing the test container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    Failed(String),
}

/// Primary test result and cleanup result of one session, kept apart.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session: TestSession,
    pub primary: Result<()>,
    pub cleanup: CleanupOutcome,
}

impl SessionOutcome {
    /// The primary result; the cleanup result has already been logged.
    pub fn into_result(self) -> Result<TestSession> {
        self.primary.map(|()| self.session)
    }
}

/// Drives the test container lifecycle through a `ContainerRuntime`.
pub struct EphemeralTestSession<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> EphemeralTestSession<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Run the configured test command against `image`.
    pub async fn run(&self, image: &BuiltImage, config: &PipelineConfig) -> SessionOutcome {
        let mut session = TestSession::for_flavor(image.flavor);
        info!(
            flavor = %image.flavor,
            container = %session.container_name,
            image = %image.reference(),
            "Running tests"
        );

        let primary = self.drive(image, config, &mut session).await;
        let cleanup = self.cleanup(&session.container_name).await;

        SessionOutcome {
            session,
            primary,
            cleanup,
        }
    }

    async fn drive(
        &self,
        image: &BuiltImage,
        config: &PipelineConfig,
        session: &mut TestSession,
    ) -> Result<()> {
        let name = session.container_name.clone();
        let image_ref = image.reference();

        let mut env = BTreeMap::new();
        env.insert("WORKSPACE_NAME".to_string(), name.clone());
        env.insert("WORKSPACE_ACCESS_PORT".to_string(), session.port.clone());

        if let Err(e) = self.runtime.run_detached(&image_ref, &name, &env).await {
            return Err(self.runtime_failure(&name, e).await);
        }

        let details = match self.runtime.inspect(&name).await {
            Ok(details) => details,
            Err(e) => return Err(self.runtime_failure(&name, e).await),
        };
        let ip = details
            .bridge_ip
            .ok_or_else(|| WsbuildError::MissingNetworkAddress {
                container: name.clone(),
            })?;
        session.ip_address = Some(ip.clone());
        info!(container = %name, ip = %ip, "Running tests inside container");

        let mut exec_env = BTreeMap::new();
        exec_env.insert("WORKSPACE_IP".to_string(), ip);
        let exit_code = match self
            .runtime
            .exec(&name, &exec_env, &config.test_command)
            .await
        {
            Ok(code) => code,
            Err(e) => return Err(self.runtime_failure(&name, e).await),
        };
        session.exit_code = Some(exit_code);

        if exit_code != 0 {
            return Err(WsbuildError::TestsFailed {
                flavor: image.flavor,
                exit_code,
            });
        }
        info!(flavor = %image.flavor, "Tests passed");
        Ok(())
    }

    /// Map a runtime error, capturing container logs for diagnosis.
    async fn runtime_failure(&self, name: &str, e: RuntimeError) -> WsbuildError {
        match e {
            RuntimeError::ImageNotFound { image } => WsbuildError::ImageNotFound { image },
            other => {
                let logs = self.runtime.logs(name).await.ok().filter(|l| !l.is_empty());
                WsbuildError::ContainerRuntime {
                    container: name.to_string(),
                    message: other.to_string(),
                    logs,
                }
            }
        }
    }

    async fn cleanup(&self, name: &str) -> CleanupOutcome {
        info!(container = %name, "Removing container");
        match self.runtime.remove(name, true).await {
            Ok(()) => {
                info!(container = %name, "Container removed");
                CleanupOutcome::Removed
            }
            Err(e) => {
                emit_cleanup_failed(name, &e);
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }
}
