//! Logging initialization.
//!
//! Logs go to stdout: plain formatting for local runs, flattened JSON for
//! collector ingestion (selected by config). The filter is overridable via
//! `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::PipelineError;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "aupipe=info,reqwest=warn";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(json: bool) -> crate::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_ansi(false))
            .try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| PipelineError::config(format!("failed to set global subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_worker_and_http_client() {
        assert!(DEFAULT_LOG_FILTER.contains("aupipe=info"));
        assert!(DEFAULT_LOG_FILTER.contains("reqwest=warn"));
    }
}
