//! Process-wide `tracing` subscriber. Logs go to stderr so command output
//! on stdout stays machine-readable.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    /// `timestamp LEVEL target: message`
    Compact,
    /// One JSON object per line
    Json,
}

/// Third-party targets that are chatty at `info`/`debug`.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("tungstenite", "warn"),
    ("tokio_tungstenite", "warn"),
    ("tower_http", "info"),
];

fn build_env_filter(level: &str) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut directives = vec![level.to_string()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }
    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|e| format!("invalid log filter '{}': {}", filter, e))
}

/// Install the global subscriber. Call once, before any other work.
pub(crate) fn init(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = build_env_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| format!("failed to install logger: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_directive_includes_quiet_targets() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_env_filter("debug").unwrap().to_string();
        assert!(filter.contains("debug"), "{}", filter);
        assert!(filter.contains("hyper=warn"), "{}", filter);
    }
}
