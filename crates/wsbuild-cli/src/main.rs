//! wsbuild - build, test and release ml-workspace image flavors
//!
//! Runs the per-flavor pipeline: the flavor build step and docker image
//! build, a test session in a disposable container, and the release that
//! propagates the version into files and pushes the image.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, Level};

use wsbuild_ci::{Collaborators, FlavorOrchestrator, PipelineReport};
use wsbuild_core::{FailurePolicy, FlavorToken, PhaseScope, PipelineConfig, DEFAULT_IMAGE_PREFIX};

#[derive(Parser, Debug)]
#[command(name = "wsbuild")]
#[command(author = "Stevedores Org")]
#[command(about = "Build, test and release ml-workspace image flavors", long_about = None)]
struct Cli {
    /// Flavor to process: all, minimal, light, full or gpu
    #[arg(long, default_value = "all")]
    flavor: FlavorToken,

    /// Version of the images being built (semver)
    #[arg(long)]
    version: String,

    /// Build the docker images
    #[arg(long)]
    make: bool,

    /// Run the test suite inside each image
    #[arg(long)]
    test: bool,

    /// Update version files and push the images
    #[arg(long)]
    release: bool,

    /// Registry prefix for released images
    #[arg(long, env = "WSBUILD_DOCKER_IMAGE_PREFIX", default_value = DEFAULT_IMAGE_PREFIX)]
    docker_image_prefix: String,

    /// Whether test and release run for every flavor or only the last one built
    #[arg(long, value_enum, default_value_t = ScopeArg::PerFlavor)]
    phase_scope: ScopeArg,

    /// What to do when a flavor fails
    #[arg(long, value_enum, default_value_t = PolicyArg::Abort)]
    on_failure: PolicyArg,

    /// Command run inside the test container (whitespace separated)
    #[arg(long)]
    test_command: Option<String>,

    /// Root of the workspace checkout
    #[arg(long, env = "WSBUILD_PROJECT_ROOT", default_value = ".")]
    project_root: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    PerFlavor,
    LastFlavor,
}

impl From<ScopeArg> for PhaseScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::PerFlavor => PhaseScope::PerFlavor,
            ScopeArg::LastFlavor => PhaseScope::LastFlavor,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Abort,
    Continue,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => FailurePolicy::AbortRun,
            PolicyArg::Continue => FailurePolicy::ContinueWithNextFlavor,
        }
    }
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::new(self.version.as_str())
            .context("Invalid --version")?
            .with_phases(self.make, self.test, self.release)
            .with_image_prefix(self.docker_image_prefix.as_str())
            .with_project_root(&self.project_root)
            .with_phase_scope(self.phase_scope.into())
            .with_failure_policy(self.on_failure.into());

        if let Some(command) = &self.test_command {
            let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if command.is_empty() {
                anyhow::bail!("--test-command must not be empty");
            }
            config = config.with_test_command(command);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    wsbuild_core::init_tracing(cli.json, level);

    let config = cli.pipeline_config()?;
    info!(
        version = %config.version,
        flavor = %cli.flavor,
        make = config.phases.make,
        test = config.phases.test,
        release = config.phases.release,
        "wsbuild {}",
        wsbuild_core::VERSION
    );

    let orchestrator = FlavorOrchestrator::new(Collaborators::system(&config));
    let report = orchestrator.run(cli.flavor, &config).await;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    print_summary(&report);
    std::process::exit(report.exit_code());
}

fn print_summary(report: &PipelineReport) {
    for failure in &report.failures {
        eprintln!("✗ {}", failure.diagnostic());
        if let Some(logs) = &failure.container_logs {
            eprintln!("  container logs:");
            for line in logs.lines() {
                eprintln!("    {line}");
            }
        }
    }

    if report.success() {
        println!(
            "✓ {} flavor(s) processed in {}ms (run {})",
            report.flavors.len(),
            report.duration_ms,
            report.run_id
        );
    } else {
        eprintln!(
            "✗ {} of {} flavor(s) failed (run {})",
            report.failures.len(),
            report.flavors.len(),
            report.run_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbuild_core::Flavor;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["wsbuild", "--version", "1.3.0"]).unwrap();
        assert_eq!(cli.flavor, FlavorToken::All);
        assert!(!cli.make && !cli.test && !cli.release);

        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.phase_scope, PhaseScope::PerFlavor);
        assert_eq!(config.failure_policy, FailurePolicy::AbortRun);
        assert_eq!(config.test_command, vec!["pytest", "/resources/tests"]);
    }

    #[test]
    fn test_full_argument_mapping() {
        let cli = Cli::try_parse_from([
            "wsbuild",
            "--flavor",
            "GPU",
            "--version",
            "2.0.0-rc.1",
            "--make",
            "--test",
            "--release",
            "--docker-image-prefix",
            "registry.local/",
            "--phase-scope",
            "last-flavor",
            "--on-failure",
            "continue",
            "--test-command",
            "pytest -x /resources/tests",
            "--project-root",
            "/tmp/ws",
        ])
        .unwrap();
        assert_eq!(cli.flavor, FlavorToken::Single(Flavor::Gpu));

        let config = cli.pipeline_config().unwrap();
        assert!(config.phases.make && config.phases.test && config.phases.release);
        assert_eq!(config.docker_image_prefix, "registry.local/");
        assert_eq!(config.phase_scope, PhaseScope::LastFlavor);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueWithNextFlavor);
        assert_eq!(config.test_command, vec!["pytest", "-x", "/resources/tests"]);
        assert_eq!(config.project_root, PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn test_paths_and_prefix_read_from_environment() {
        use clap::CommandFactory;

        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_string)
        };
        assert_eq!(
            env_of("project_root").as_deref(),
            Some("WSBUILD_PROJECT_ROOT")
        );
        assert_eq!(
            env_of("docker_image_prefix").as_deref(),
            Some("WSBUILD_DOCKER_IMAGE_PREFIX")
        );
    }

    #[test]
    fn test_version_is_required() {
        assert!(Cli::try_parse_from(["wsbuild", "--make"]).is_err());
    }

    #[test]
    fn test_unknown_flavor_is_rejected() {
        assert!(Cli::try_parse_from(["wsbuild", "--version", "1.3.0", "--flavor", "tiny"]).is_err());
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let cli = Cli::try_parse_from(["wsbuild", "--version", "latest"]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }

    #[test]
    fn test_blank_test_command_is_rejected() {
        let cli =
            Cli::try_parse_from(["wsbuild", "--version", "1.3.0", "--test-command", "  "]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }
}
