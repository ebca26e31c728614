//! # Logging Bootstrap
//!
//! Wires `tracing` up the way this node is actually operated: the
//! requested level fans out over the two Tessera crates while HTTP
//! plumbing stays capped (a node at `debug` wants engine internals, not
//! a hyper frame dump), `RUST_LOG` overrides everything when set, and
//! the output format follows the deployment — JSON lines under
//! `NODE_ENV=production` for log shippers, human-readable output
//! everywhere else, unless the operator pins a format explicitly.
//!
//! Everything goes to stderr; stdout belongs to subcommand output like
//! `tessera-node version`.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// The node's default filter: the requested level for Tessera code,
/// request tracing at `info`, transport noise at `warn`.
fn filter_directives(level: &str) -> String {
    format!("tessera_node={level},tessera_protocol={level},tower_http=info,hyper=warn")
}

/// Resolve `Auto` against the deployment environment.
fn use_json(format: LogFormat, production: bool) -> bool {
    match format {
        LogFormat::Json => true,
        LogFormat::Pretty => false,
        LogFormat::Auto => production,
    }
}

/// Install the global subscriber. Call once, before the first log line;
/// a second call panics.
pub fn init(level: &str, format: LogFormat, production: bool) {
    let directives = filter_directives(level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if use_json(format, production) {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        level,
        json = use_json(format, production),
        "logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_scope_the_level_to_tessera_crates() {
        let d = filter_directives("debug");
        assert!(d.contains("tessera_node=debug"));
        assert!(d.contains("tessera_protocol=debug"));
        // The HTTP stack stays at its own level regardless.
        assert!(d.contains("tower_http=info"));
        assert!(d.contains("hyper=warn"));
    }

    #[test]
    fn auto_format_follows_environment() {
        assert!(use_json(LogFormat::Auto, true));
        assert!(!use_json(LogFormat::Auto, false));
    }

    #[test]
    fn explicit_format_wins_over_environment() {
        assert!(use_json(LogFormat::Json, false));
        assert!(!use_json(LogFormat::Pretty, true));
    }
}
