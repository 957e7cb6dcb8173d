//! `tracing-subscriber` initialisation.
//!
//! Verbosity is controlled the same way as the reference tool's `-v`
//! flag: absent, it shows warnings and errors only; each repetition
//! drops the default level by one notch, down to full `trace`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `verbosity` is the number
/// of times `-v` was given on the command line (0 = quiet).
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
