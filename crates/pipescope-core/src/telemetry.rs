//! Tracing setup for the pipescope binary.
//!
//! Logs go to stderr so command output on stdout stays pipeable. HTTP
//! stack crates are held at `warn` unless `RUST_LOG` says otherwise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose debug output would drown the workflow events.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    directives
}

/// Install the global subscriber; later calls are no-ops.
///
/// `json` switches to newline-delimited JSON, `level` applies when
/// `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let (text_layer, json_layer) = if json {
        let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (None, Some(base.json()))
    } else {
        let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (Some(base), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
