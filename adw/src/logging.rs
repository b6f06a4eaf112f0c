//! Diagnostic tracing for the `adw` binary.
//!
//! Spans cover `Director::run` (workflow, max iterations), each `evaluate` call
//! (evaluator, iteration), failure analysis and every child process spawned for
//! the validation command, the coder or a judge. Coder, judge and command
//! failures and timeouts are reported at `warn`; iteration progress at `info`;
//! spawn and prompt-rendering detail at `debug`.
//!
//! None of this is the run log (`io/run_log`). Tracing goes to stderr and is
//! filtered with `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber, honouring `RUST_LOG`.
///
/// ```bash
/// RUST_LOG=adw=info adw run pager
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
