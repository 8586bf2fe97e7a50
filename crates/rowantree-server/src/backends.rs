//! Backend selection.
//!
//! Turns the `infrastructure` config section into the two persistence
//! ports the engine runs on.
//!
//! | `backend` | `queue_backend` | Users | Queue |
//! |-----------|-----------------|-------|-------|
//! | `memory` | `primary` | [`InMemoryStore`] | the same [`InMemoryStore`] |
//! | `memory` | `dragonfly` | [`InMemoryStore`] | [`DragonflyActionQueue`] |
//! | `postgres` | `primary` | [`PostgresUserRepository`] | [`PostgresActionQueue`] |
//! | `postgres` | `dragonfly` | [`PostgresUserRepository`] | [`DragonflyActionQueue`] |

use std::sync::Arc;

use rowantree_core::config::{Backend, InfrastructureConfig, QueueBackend};
use rowantree_core::{ActionQueue, InMemoryStore, UserRepository};
use rowantree_db::{DragonflyActionQueue, DragonflyPool, PostgresPool};
use tracing::info;

use crate::error::ServerError;

/// The adapters chosen for this process.
pub struct Backends {
    /// User aggregate store.
    pub users: Arc<dyn UserRepository>,
    /// Action queue.
    pub queue: Arc<dyn ActionQueue>,
    /// The `PostgreSQL` pool, when one was opened, so it can be closed on
    /// shutdown.
    pub postgres: Option<PostgresPool>,
}

/// Connect the configured backends. `PostgreSQL` migrations run here.
pub async fn connect(config: &InfrastructureConfig) -> Result<Backends, ServerError> {
    let (users, primary_queue, postgres): (
        Arc<dyn UserRepository>,
        Arc<dyn ActionQueue>,
        Option<PostgresPool>,
    ) = match config.backend {
        Backend::Memory => {
            info!("Using in-memory user store; state is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            (
                Arc::clone(&store) as Arc<dyn UserRepository>,
                store as Arc<dyn ActionQueue>,
                None,
            )
        }
        Backend::Postgres => {
            let pool = PostgresPool::open(config).await?;
            (
                Arc::new(pool.user_repository()) as Arc<dyn UserRepository>,
                Arc::new(pool.action_queue()) as Arc<dyn ActionQueue>,
                Some(pool),
            )
        }
    };

    let queue = match config.queue_backend {
        QueueBackend::Primary => primary_queue,
        QueueBackend::Dragonfly => {
            let pool = DragonflyPool::connect(&config.dragonfly_url).await?;
            info!("Using Dragonfly action queue");
            Arc::new(DragonflyActionQueue::new(&pool)) as Arc<dyn ActionQueue>
        }
    };

    Ok(Backends {
        users,
        queue,
        postgres,
    })
}
