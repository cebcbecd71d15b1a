//! Logging setup utilities for the Agora relay.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_CRATE: &str = "agora_server";

/// Initialize the tracing subscriber with the specified default log level.
///
/// Filters are applied to the server library crate (`agora_server`) and to the
/// binary. The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "agora_server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use agora_shared::logger::setup_logger;
///
/// setup_logger("agora_server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_directives(binary_name: &str, default_log_level: &str) -> String {
    let mut targets = vec![SERVER_CRATE.to_string()];
    let binary_target = binary_name.replace('-', "_");
    if binary_target != SERVER_CRATE {
        targets.push(binary_target);
    }
    targets.push("tower_http".to_string());

    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
