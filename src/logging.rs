//! Log context handed to each pipeline component.
//!
//! The library never installs or mutates a logger. Components receive a
//! [`LogContext`] at construction and emit through the `log` facade under the
//! context's target, so the embedding application decides where records go
//! and can filter per component (`RUST_LOG=live_spectrogram::capture=debug`).

use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LogContext {
    target: Arc<str>,
}

impl LogContext {
    pub fn new(target: &str) -> Self {
        Self {
            target: Arc::from(target),
        }
    }

    /// Context for a sub-component, e.g. `live_spectrogram::capture`
    pub fn child(&self, name: &str) -> Self {
        Self::new(&format!("{}::{}", self.target, name))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn enabled(&self, level: log::Level) -> bool {
        log::log_enabled!(target: self.target(), level)
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new("live_spectrogram")
    }
}
