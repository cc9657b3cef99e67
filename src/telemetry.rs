//! Tracing setup and standard spans.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one listener handling one bus event.
    pub fn event(name: &str, listener: &str) -> Span {
        info_span!("event", name = %name, listener = %listener)
    }

    /// Span for a plugin lifecycle call (`load`, `reset`).
    pub fn plugin(name: &str, phase: &'static str) -> Span {
        info_span!("plugin", name = %name, phase = phase)
    }

    /// Span for a command handled by a plugin.
    pub fn command(name: &str, source: &str, target: Option<&str>) -> Span {
        if let Some(target) = target {
            info_span!("command", name = %name, source = %source, target = %target)
        } else {
            info_span!("command", name = %name, source = %source)
        }
    }
}
