//! Shared application state for both routers.

use std::sync::Arc;

use rowantree_core::EconomyEngine;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. The
/// engine is the only dependency; it already owns its adapters and rules.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The economy engine every handler delegates to.
    pub engine: Arc<EconomyEngine>,
}

impl AppState {
    /// Wrap an engine.
    pub const fn new(engine: Arc<EconomyEngine>) -> Self {
        Self { engine }
    }
}
