//! Persistence adapters for the Rowan Tree economy (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` holds user aggregates and the ledger journal and can also
//! hold the action queue. `Dragonfly` is an alternative home for the
//! action queue only. Each adapter implements a port from
//! `rowantree-core`, so the server picks backends at startup without the
//! engine knowing which it got.
//!
//! # Architecture
//!
//! ```text
//! EconomyEngine
//!     |
//!     +-- UserRepository --> PostgresUserRepository (users, user_*, ledger_journal)
//!     |
//!     +-- ActionQueue -----> PostgresActionQueue   (action_queue)
//!                        \-> DragonflyActionQueue  (queue:pending, queue:entries)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, migrations
//! - [`user_store`] -- Aggregate load/save with optimistic versioning
//! - [`queue_store`] -- `PostgreSQL` action queue
//! - [`dragonfly`] -- `Dragonfly` connection and action queue
//! - [`error`] -- [`DbError`] and its mapping onto the port errors

pub mod dragonfly;
pub mod error;
pub mod postgres;
pub mod queue_store;
pub mod user_store;

// Re-export primary types for convenience.
pub use dragonfly::{DragonflyActionQueue, DragonflyPool};
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use queue_store::PostgresActionQueue;
pub use user_store::{JournalRow, PostgresUserRepository};
