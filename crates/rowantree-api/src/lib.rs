//! HTTP delivery layer for the Rowan Tree economy engine.
//!
//! This crate exposes the engine over two Axum routers:
//!
//! - **Public API** (`/v1/user/...`) for per-user reads and economy
//!   operations
//! - **Operator API** (`/v1/world...`) for world status and tick control,
//!   bound to a separate port
//!
//! # Architecture
//!
//! Handlers hold no state of their own. Each one parses the path, validates
//! the body with `validator`, calls the shared
//! [`EconomyEngine`](rowantree_core::EconomyEngine), and maps any
//! failure through [`ApiError`] to a status code and JSON body.

pub mod error;
pub mod handlers;
pub mod operator;
pub mod requests;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::{build_operator_router, build_router};
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
