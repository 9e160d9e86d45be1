//! Structured logging bootstrap.
//!
//! All crates log through `tracing` with structured fields. Output format
//! is selected at startup:
//! - `LOG_FORMAT=json` emits one JSON object per event, for log shipping
//! - anything else emits human-readable text with ANSI colors
//!
//! Level filtering uses the standard `RUST_LOG` syntax (default `info`),
//! e.g. `RUST_LOG=vb_consumer=debug,lapin=warn`.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install the global tracing subscriber for the given service.
///
/// Must be called once, before any log events are emitted. The service
/// name is currently informational only; filtering is per-crate via
/// `RUST_LOG`.
pub fn init_logging(_service_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_output = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .flatten_event(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .init();
    }
}
