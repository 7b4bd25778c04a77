//! Tracing subscriber setup for the runner controller binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,runner_controller=debug";

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set. `json` switches to one JSON
/// object per line for log collectors.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
