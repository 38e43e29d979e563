//! Structured Logging & Tracing
//!
//! One `tracing` subscriber per process:
//! - Filter built from [`TracingConfig`] directives (`worms_core::terrain=debug`)
//! - `RUST_LOG`, when set, replaces the configured directives
//! - [`TimingSpan`] around mesh generation and culling, reporting elapsed time
//! - Initialization is idempotent; a subscriber the host installed first wins

use std::sync::Once;
use std::time::Instant;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Installs the subscriber when added to an app
#[derive(Default)]
pub struct LoggingPlugin {
    pub config: TracingConfig,
}

impl Plugin for LoggingPlugin {
    fn build(&self, _app: &mut App) {
        init_tracing(&self.config);
    }
}

/// The `logging` section of the match config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Level for everything not named in `directives`
    pub default_level: String,
    /// `target=level` pairs, in `RUST_LOG` syntax
    pub directives: Vec<String>,
    pub show_targets: bool,
    pub show_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            directives: vec![
                "worms_core::terrain=info".into(),
                "worms_core::replication=warn".into(),
                "worms_core::session=info".into(),
            ],
            show_targets: true,
            show_thread_ids: false,
        }
    }
}

impl TracingConfig {
    pub fn filter_string(&self) -> String {
        std::iter::once(self.default_level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.trim().is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parsed filter; a bad directive falls back to the default level alone
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.filter_string())
            .or_else(|_| EnvFilter::try_new(&self.default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

static TRACING_INIT: Once = Once::new();

pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.env_filter());
    let (targets, thread_ids) = (config.show_targets, config.show_thread_ids);
    TRACING_INIT.call_once(move || {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(targets)
            .with_thread_ids(thread_ids)
            .with_file(false)
            .with_line_number(false)
            .compact();

        // host (or a test harness) may already own the global subscriber
        let _ = subscriber.try_init();
    });
}

/// Entered span that logs its own duration at debug level when dropped
pub struct TimingSpan {
    name: &'static str,
    started: Instant,
    _span: tracing::span::EnteredSpan,
}

impl TimingSpan {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
            _span: tracing::info_span!("timed", op = name).entered(),
        }
    }

    pub fn elapsed_micros(&self) -> u128 {
        self.started.elapsed().as_micros()
    }
}

impl Drop for TimingSpan {
    fn drop(&mut self) {
        tracing::debug!(op = self.name, elapsed_us = self.elapsed_micros(), "done");
    }
}
