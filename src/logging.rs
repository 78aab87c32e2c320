//! Subscriber setup for applications embedding the engine.

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "clipshrink=trace,cs_pipeline=trace,cs_av=debug,cs_probe=debug,cs_core=debug"
    } else {
        "clipshrink=info,cs_pipeline=info,cs_av=info,cs_probe=warn,cs_core=info"
    }
}

/// Install a `fmt` subscriber. `RUST_LOG` wins over the built-in defaults.
///
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls harmless.
pub fn init(verbose: bool) -> bool {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(verbose).to_string());

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .try_init()
        .is_ok()
}
