//! Tracing initialisation for the wsbuild binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored since
//! the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level; everything else stays at `warn`.
const PIPELINE_TARGETS: [&str; 3] = ["wsbuild", "wsbuild_core", "wsbuild_ci"];

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PIPELINE_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON log lines, keeping the span list so
///   every phase event carries its `run_id` and `flavor`.
/// * `level` - verbosity of the pipeline crates when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
