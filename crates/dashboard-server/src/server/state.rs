use super::config::ServerConfig;
use super::store::Store;
use dashboard_core::export::{ExportOptions, Exporter};
use std::{
    sync::{Arc, atomic::AtomicUsize},
    time::Instant,
};

/// Shared, cheaply cloneable application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub exporter: Exporter,
    /// Exports currently producing output.
    pub exports_inflight: Arc<AtomicUsize>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Store) -> Self {
        let exporter = Exporter::new(ExportOptions {
            batch_size: config.export_batch_size,
            ..ExportOptions::default()
        });
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            exporter,
            exports_inflight: Arc::default(),
            started_at: Instant::now(),
        }
    }
}
