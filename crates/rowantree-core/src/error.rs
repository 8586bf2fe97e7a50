//! Engine error types and the stable error-kind projection.

use rowantree_economy::EconomyError;
use rowantree_ledger::LedgerAnomaly;
use rowantree_types::UserId;
use serde::{Deserialize, Serialize};

use crate::repository::RepositoryError;

/// Errors returned by [`EconomyEngine`](crate::EconomyEngine) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// An economy rule rejected the operation.
    #[error(transparent)]
    Economy(#[from] EconomyError),

    /// No user has this id.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// A user with this id already exists.
    #[error("user already exists: {0}")]
    UserAlreadyExists(UserId),

    /// The request is malformed in a way the economy does not model.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The persistence adapter failed. The operation saved nothing.
    #[error("persistence failure: {0}")]
    Persistence(RepositoryError),

    /// A computed state did not reconcile with its journal.
    #[error("{0}")]
    Anomaly(LedgerAnomaly),
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(user_id) => Self::UserNotFound(user_id),
            RepositoryError::AlreadyExists(user_id) => Self::UserAlreadyExists(user_id),
            other => Self::Persistence(other),
        }
    }
}

/// The failure taxonomy exposed to delivery layers.
///
/// Delivery code maps kinds to responses without inspecting the
/// underlying error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A store cannot cover a debit.
    InsufficientResources,
    /// A tier cannot cover a transport.
    InsufficientPopulation,
    /// No recipe has the requested id.
    UnknownRecipe,
    /// The recipe is gated behind an inactive feature.
    RecipeUnavailable,
    /// Unknown or non-adjacent tiers.
    InvalidTier,
    /// A malformed request.
    InvalidRequest,
    /// No user has the requested id.
    UserNotFound,
    /// The user already exists.
    UserAlreadyExists,
    /// The persistence layer failed.
    PersistenceFailure,
    /// An invariant was violated inside the engine.
    Internal,
}

impl ErrorKind {
    /// The kind as it appears on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientResources => "InsufficientResources",
            Self::InsufficientPopulation => "InsufficientPopulation",
            Self::UnknownRecipe => "UnknownRecipe",
            Self::RecipeUnavailable => "RecipeUnavailable",
            Self::InvalidTier => "InvalidTier",
            Self::InvalidRequest => "InvalidRequest",
            Self::UserNotFound => "UserNotFound",
            Self::UserAlreadyExists => "UserAlreadyExists",
            Self::PersistenceFailure => "PersistenceFailure",
            Self::Internal => "Internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    /// Project this error onto its [`ErrorKind`].
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Economy(error) => match error {
                EconomyError::InsufficientResources { .. } => ErrorKind::InsufficientResources,
                EconomyError::InsufficientPopulation { .. } => ErrorKind::InsufficientPopulation,
                EconomyError::UnknownRecipe(_) => ErrorKind::UnknownRecipe,
                EconomyError::RecipeUnavailable { .. } => ErrorKind::RecipeUnavailable,
                EconomyError::InvalidTier { .. } => ErrorKind::InvalidTier,
                EconomyError::InvalidQuantity(_) => ErrorKind::InvalidRequest,
                EconomyError::Overflow(_) => ErrorKind::Internal,
            },
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::UserAlreadyExists(_) => ErrorKind::UserAlreadyExists,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
            Self::Anomaly(_) => ErrorKind::Internal,
        }
    }
}
