//! Operator REST handlers for world-level operations.
//!
//! Served by a separate router on its own port. Access to that port is the
//! privilege boundary; these handlers perform no authentication.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/v1/world` | World status |
//! | `POST` | `/v1/world/queue` | Optionally enqueue users, then run one tick |
//! | `POST` | `/v1/world/queue/{user_id}` | Enqueue one user |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use rowantree_core::TickReport;
use rowantree_types::UserId;
use validator::Validate;

use crate::error::ApiError;
use crate::handlers::parse_user_id;
use crate::requests::QueueRequest;
use crate::state::AppState;

/// Response of `POST /v1/world/queue`.
#[derive(Debug, serde::Serialize)]
struct ProcessQueueResponse {
    /// Users newly queued by this request.
    enqueued: u64,
    /// The tick that followed.
    report: TickReport,
}

/// Response of `POST /v1/world/queue/{user_id}`.
#[derive(Debug, serde::Serialize)]
struct EnqueueResponse {
    user_id: UserId,
    /// `false` when the user was already pending.
    queued: bool,
}

// ---------------------------------------------------------------------------
// GET /v1/world
// ---------------------------------------------------------------------------

/// Active users, their total population, and the queue depth.
pub async fn world_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine.status().await?))
}

// ---------------------------------------------------------------------------
// POST /v1/world/queue
// ---------------------------------------------------------------------------

/// Enqueue the listed users and/or every active user, then run one tick.
///
/// The body is optional; without one this just processes whatever is
/// already queued. An unknown user in `user_ids` fails the request before
/// anyone is queued or the tick runs.
pub async fn process_queue(
    State(state): State<Arc<AppState>>,
    body: Option<Json<QueueRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    request.validate()?;

    let mut enqueued = state.engine.enqueue_users(&request.user_ids).await?;
    if request.enqueue_active {
        enqueued = enqueued.saturating_add(state.engine.enqueue_active_users().await?);
    }

    let report = state.engine.process_tick().await?;
    tracing::info!(tick = report.tick, enqueued, "Operator processed the queue");
    Ok(Json(ProcessQueueResponse { enqueued, report }))
}

// ---------------------------------------------------------------------------
// POST /v1/world/queue/{user_id}
// ---------------------------------------------------------------------------

/// Queue one user for the next tick.
pub async fn enqueue_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let queued = state.engine.enqueue(user_id).await?;
    Ok(Json(EnqueueResponse { user_id, queued }))
}
