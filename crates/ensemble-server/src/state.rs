use std::sync::Arc;

use ensemble_core::Catalog;
use ensemble_llm::RelayClient;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable and read-only: every turn gets its own relay stream, so
/// nothing here needs a lock.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub relay: RelayClient,
}

impl AppState {
    pub fn new(catalog: Catalog, relay: RelayClient) -> Self {
        Self {
            catalog: Arc::new(catalog),
            relay,
        }
    }
}
