//! Request bodies and query parameters.
//!
//! Every body derives [`Validate`]; handlers call [`Validate::validate`] before the
//! engine sees the request. Store names are checked by serde against the
//! closed [`Store`] enum, so an unknown store is rejected at extraction.

use rowantree_types::{Store, UserId};
use serde::Deserialize;
use validator::Validate;

/// Upper bound on rates and counts accepted over HTTP.
pub const MAX_QUANTITY: u64 = 1_000_000_000_000;

/// Longest accepted rule id (recipe or tier).
pub const MAX_ID_LEN: u64 = 64;

/// Most user ids accepted in one queue request.
pub const MAX_QUEUE_BATCH: u64 = 10_000;

/// Body of `POST /v1/user/{user_id}/active`.
#[derive(Debug, Deserialize, Validate)]
pub struct SetActiveRequest {
    /// New value of the active flag.
    pub active: bool,
}

/// Body of `POST /v1/user/{user_id}/income`.
#[derive(Debug, Deserialize, Validate)]
pub struct SetIncomeRequest {
    /// The store the source feeds.
    pub store: Store,
    /// Quantity per tick.
    #[validate(range(max = MAX_QUANTITY))]
    pub rate: u64,
    /// Whether the source accrues (default `true`).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Body of `POST /v1/user/{user_id}/merchant`.
#[derive(Debug, Deserialize, Validate)]
pub struct TransformRequest {
    /// Recipe id.
    #[validate(length(min = 1, max = MAX_ID_LEN))]
    pub recipe: String,
}

/// Body of `POST /v1/user/{user_id}/transport`.
#[derive(Debug, Deserialize, Validate)]
pub struct TransportRequest {
    /// Source tier.
    #[validate(length(min = 1, max = MAX_ID_LEN))]
    pub from: String,
    /// Destination tier.
    #[validate(length(min = 1, max = MAX_ID_LEN))]
    pub to: String,
    /// Heads to move.
    #[validate(range(min = 1, max = MAX_QUANTITY))]
    pub count: u64,
}

/// Body of `POST /v1/world/queue`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct QueueRequest {
    /// Users to enqueue before the tick.
    #[serde(default)]
    #[validate(length(max = MAX_QUEUE_BATCH))]
    pub user_ids: Vec<UserId>,
    /// Also enqueue every active user.
    #[serde(default)]
    pub enqueue_active: bool,
}

/// Query string of the feature reads.
#[derive(Debug, Default, Deserialize)]
pub struct FeaturesQuery {
    /// Include configured descriptions.
    #[serde(default)]
    pub details: bool,
}
