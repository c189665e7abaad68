//! Diagnostic logging setup.
//!
//! Diagnostics go through `tracing` to stderr so they never interleave with
//! the progress lines [`crate::output`] prints on stdout. `RUST_LOG` wins
//! when set; otherwise the crate logs at `info`, or `debug` with `--verbose`.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "photo_ingest=info";
const VERBOSE_LOG_FILTER: &str = "photo_ingest=debug";

/// Filter used when `RUST_LOG` is absent or invalid.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_level() {
        assert_eq!(default_filter(false), "photo_ingest=info");
        assert_eq!(default_filter(true), "photo_ingest=debug");
    }

    #[test]
    fn default_filters_parse() {
        assert!(EnvFilter::try_new(default_filter(false)).is_ok());
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(false);
        init_logging(true);
    }
}
