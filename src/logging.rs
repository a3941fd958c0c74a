// src/logging.rs
//
// tracing-subscriber initialization. Replaces the previous
// `eprintln!("[Component:{}] ...")` convention with structured,
// level-filtered logging; the `-v 0..3` flag maps onto a level filter the
// same way the original verbosity knobs gated diagnostic output.

use tracing_subscriber::EnvFilter;

/// Map `-v 0..3` onto a tracing level: 0 = warnings and errors only, 3 =
/// trace-level detail.
fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initializes the global tracing subscriber. `RUST_LOG`, when set,
/// overrides the verbosity-derived default filter.
pub fn init(verbosity: u8) {
    let default_filter = level_for_verbosity(verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}
