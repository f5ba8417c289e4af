//! Logging setup for the command-line tool

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Default filter for a verbosity level (`-v` count)
pub fn default_filter(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "seq2seq_tune=info,warn",
        1 => "seq2seq_tune=debug,info",
        2 => "seq2seq_tune=trace,debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `quiet` always limits output to errors;
/// otherwise `RUST_LOG` takes precedence over the verbosity flags.
pub fn init_logging(verbosity: u8, quiet: bool, json_output: bool) -> Result<()> {
    let env_filter = build_filter(verbosity, quiet, std::env::var("RUST_LOG").ok().as_deref());

    let result = if json_output {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(false).with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).try_init()
    };

    result.map_err(|e| Error::internal(format!("failed to initialise logging: {}", e)))
}

/// Filter for the given flags and `RUST_LOG` value
pub fn build_filter(verbosity: u8, quiet: bool, rust_log: Option<&str>) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter(verbosity, quiet)))
}
