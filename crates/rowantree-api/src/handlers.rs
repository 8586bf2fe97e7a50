//! Public REST handlers.
//!
//! Every handler parses the user id from the path, validates the body,
//! and delegates to the [`EconomyEngine`](rowantree_core::EconomyEngine).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health/plain` | Liveness |
//! | `POST` | `/v1/user/{user_id}` | Create a user |
//! | `DELETE` | `/v1/user/{user_id}` | Delete a user |
//! | `GET` / `POST` | `/v1/user/{user_id}/active` | Read / set the active flag |
//! | `GET` | `/v1/user/{user_id}/stores` | Store quantities |
//! | `GET` / `POST` | `/v1/user/{user_id}/income` | Read / set income sources |
//! | `GET` | `/v1/user/{user_id}/features` | All features |
//! | `GET` | `/v1/user/{user_id}/features/active` | Active features |
//! | `GET` / `POST` | `/v1/user/{user_id}/merchant` | Available recipes / transform |
//! | `GET` | `/v1/user/{user_id}/population` | Population per tier |
//! | `POST` | `/v1/user/{user_id}/transport` | Move population between tiers |
//! | `GET` | `/v1/user/{user_id}/state` | Full user state |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use rowantree_types::{RecipeId, TierId, UserId};
use validator::Validate;

use crate::error::ApiError;
use crate::requests::{
    FeaturesQuery, SetActiveRequest, SetIncomeRequest, TransformRequest, TransportRequest,
};
use crate::state::AppState;

/// Response body of the active-flag endpoints.
#[derive(Debug, serde::Serialize)]
struct ActiveResponse {
    active: bool,
}

// ---------------------------------------------------------------------------
// GET /health/plain
// ---------------------------------------------------------------------------

/// Liveness check.
pub async fn health_plain() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// User lifecycle
// ---------------------------------------------------------------------------

/// Create a user from the configured starting state.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let created = state.engine.create_user(Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Delete a user and everything it owns.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.engine.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Read the active flag.
pub async fn get_active(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let active = state.engine.is_active(user_id).await?;
    Ok(Json(ActiveResponse { active }))
}

/// Set the active flag. Activating also queues the user.
pub async fn set_active(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    body.validate()?;
    let active = state.engine.set_active(user_id, body.active).await?;
    Ok(Json(ActiveResponse { active }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Store quantities.
pub async fn get_stores(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.stores(user_id).await?))
}

/// Income sources.
pub async fn get_income(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.incomes(user_id).await?))
}

/// Every feature, optionally with descriptions (`?details=true`).
pub async fn get_features(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<FeaturesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.features(user_id, query.details).await?))
}

/// Active features only.
pub async fn get_active_features(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<FeaturesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(
        state.engine.active_features(user_id, query.details).await?,
    ))
}

/// Recipes the user may perform.
pub async fn get_merchants(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.merchants(user_id).await?))
}

/// Population per tier.
pub async fn get_population(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.population(user_id).await?))
}

/// Everything about a user in one read.
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.engine.user_state(user_id).await?))
}

// ---------------------------------------------------------------------------
// Economy operations
// ---------------------------------------------------------------------------

/// Create or update an income source.
pub async fn set_income(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<SetIncomeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    body.validate()?;
    let source = state
        .engine
        .set_income(user_id, body.store, body.rate, body.enabled)
        .await?;
    Ok(Json(source))
}

/// Perform a merchant transform and return its ledger delta.
pub async fn transform(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<TransformRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    body.validate()?;
    let delta = state
        .engine
        .transform(user_id, &RecipeId::from(body.recipe))
        .await?;
    Ok(Json(delta))
}

/// Move population between adjacent tiers; returns the new counts.
pub async fn transport(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<TransportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    body.validate()?;
    let population = state
        .engine
        .transport(
            user_id,
            &TierId::from(body.from),
            &TierId::from(body.to),
            body.count,
        )
        .await?;
    Ok(Json(population))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a user id from a path segment.
pub(crate) fn parse_user_id(s: &str) -> Result<UserId, ApiError> {
    s.parse::<UserId>()
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}
