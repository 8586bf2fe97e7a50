//! Orchestration for the Rowan Tree economy.
//!
//! This crate turns the pure rules in `rowantree-economy` into serialised,
//! persisted operations. It owns no storage of its own: adapters implement
//! the [`UserRepository`] and [`ActionQueue`] ports and are handed to the
//! [`EconomyEngine`] at construction.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `rowantree-config.yaml` into
//!   strongly-typed structs.
//! - [`engine`] -- [`EconomyEngine`]: user lifecycle, reads, economy
//!   operations, the world tick, and world status.
//! - [`error`] -- [`EngineError`] and the [`ErrorKind`] taxonomy.
//! - [`locks`] -- Per-user async mutex registry.
//! - [`memory`] -- [`InMemoryStore`], an adapter for both ports.
//! - [`repository`] -- The persistence ports.
//! - [`runner`] -- Timer-driven tick scheduler.
//! - [`tick`] -- The per-user tick pipeline and [`TickReport`].

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod memory;
pub mod repository;
pub mod runner;
pub mod tick;

pub use config::{ConfigError, RowantreeConfig};
pub use engine::EconomyEngine;
pub use error::{EngineError, ErrorKind};
pub use memory::InMemoryStore;
pub use repository::{ActionQueue, RepoFuture, RepositoryError, UserRepository, WorldTotals};
pub use runner::{SchedulerConfig, SchedulerControl, SchedulerEndReason, SchedulerResult, run_scheduler};
pub use tick::{TickPhase, TickReport, UserTickFailure, UserTickOutcome};
