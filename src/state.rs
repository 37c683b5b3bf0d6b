//! # Application State
//!
//! Shared state handed to every HTTP and WebSocket handler: configuration,
//! the event dispatcher (which owns the session registry), and the record
//! store for the export surface.

use crate::config::AppConfig;
use crate::dispatcher::EventDispatcher;
use crate::storage::SessionStore;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Configuration snapshot taken at startup.
    pub config: Arc<RwLock<AppConfig>>,

    /// Single dispatcher instance; all connections route inbound events
    /// through it.
    pub dispatcher: Arc<EventDispatcher>,

    /// Record store, shared with the dispatcher. The export handlers read
    /// from it directly.
    pub store: Arc<dyn SessionStore>,

    /// Inbound-event counters, updated by the connection layer.
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Server start time, for uptime reporting.
    pub start_time: Instant,
}

/// Lightweight counters across all connections.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Inbound events processed since server start.
    pub event_count: u64,

    /// Errors sent back to clients since server start.
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, dispatcher: Arc<EventDispatcher>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            dispatcher,
            store,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration. Cloning releases the lock
    /// immediately so handlers never hold it across awaits.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_event_count(&self) {
        self.metrics.write().unwrap().event_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
