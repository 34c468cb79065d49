//! Logging setup.
//!
//! Levels default to `INFO` and can be overridden per scope through
//! environment variables: `LOG_LEVEL_ROOT` for everything,
//! `LOG_LEVEL_GHS` for this crate, and `LOG_LEVEL_GIT` for the git
//! collaborator module. The `-v` flag raises the crate level to debug
//! unless `LOG_LEVEL_GHS` says otherwise.

use std::env;

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the default level.
pub const LOG_LEVEL_ROOT: &str = "LOG_LEVEL_ROOT";
/// Environment variable controlling this crate's level.
pub const LOG_LEVEL_GHS: &str = "LOG_LEVEL_GHS";
/// Environment variable controlling the git collaborator's level.
pub const LOG_LEVEL_GIT: &str = "LOG_LEVEL_GIT";

/// Initializes the global subscriber. Call once, early in `main`.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_new(directives(verbose))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the filter directives from the environment and the verbose flag.
fn directives(verbose: bool) -> String {
    let root = level_from_env(LOG_LEVEL_ROOT).unwrap_or_else(|| "info".to_string());
    let ghs = level_from_env(LOG_LEVEL_GHS)
        .unwrap_or_else(|| if verbose { "debug" } else { root.as_str() }.to_string());

    let mut directives = format!("{root},ghs={ghs}");
    if let Some(git) = level_from_env(LOG_LEVEL_GIT) {
        directives.push_str(&format!(",ghs::git_cli={git}"));
    }
    directives
}

fn level_from_env(var: &str) -> Option<String> {
    let value = env::var(var).ok()?;
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(value),
        _ => None,
    }
}
