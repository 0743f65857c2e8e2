//! Tracing subscriber setup.

use crate::config::LoggingSettings;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `settings.level`. Returns false if a subscriber was
/// already installed, which leaves the existing one in place.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if settings.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let settings = LoggingSettings::default();
        init_tracing(&settings);
        assert!(!init_tracing(&settings));
    }
}
