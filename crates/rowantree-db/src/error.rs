//! Error types for the persistence adapters.
//!
//! Adapter internals return [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. At the port boundary every [`DbError`] is
//! folded into the engine's [`RepositoryError`].

use rowantree_core::RepositoryError;
use rowantree_types::UserId;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No row for this user.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// A row for this user already exists.
    #[error("user {0} already exists")]
    UserExists(UserId),

    /// The stored version did not match the caller's.
    #[error("version conflict for user {user_id}: expected {expected}")]
    VersionConflict {
        /// The user being saved.
        user_id: UserId,
        /// The version the caller loaded.
        expected: u64,
    },

    /// A quantity does not fit the `BIGINT` column it maps to.
    #[error("{0} is out of range for the database")]
    OutOfRange(&'static str),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for RepositoryError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::UserNotFound(user_id) => Self::NotFound(user_id),
            DbError::UserExists(user_id) => Self::AlreadyExists(user_id),
            DbError::VersionConflict { user_id, expected } => Self::Conflict { user_id, expected },
            DbError::Corrupt(_) | DbError::Serialization(_) | DbError::OutOfRange(_) => {
                Self::Corrupt(error.to_string())
            }
            DbError::Postgres(_)
            | DbError::Migration(_)
            | DbError::Dragonfly(_)
            | DbError::Config(_) => Self::Backend(error.to_string()),
        }
    }
}

/// Convert an engine quantity to its `BIGINT` column value.
pub(crate) fn to_db(value: u64, what: &'static str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_overflow| DbError::OutOfRange(what))
}

/// Convert a `BIGINT` column value back to an engine quantity.
pub(crate) fn from_db(value: i64, what: &'static str) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::Corrupt(format!("negative {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_variants_keep_their_meaning() {
        let user = UserId::new();
        assert_eq!(
            RepositoryError::from(DbError::UserNotFound(user)),
            RepositoryError::NotFound(user)
        );
        assert_eq!(
            RepositoryError::from(DbError::VersionConflict {
                user_id: user,
                expected: 4,
            }),
            RepositoryError::Conflict {
                user_id: user,
                expected: 4,
            }
        );
        assert!(matches!(
            RepositoryError::from(DbError::Corrupt("store 'mana'".to_owned())),
            RepositoryError::Corrupt(_)
        ));
        assert!(matches!(
            RepositoryError::from(DbError::Config("bad url".to_owned())),
            RepositoryError::Backend(_)
        ));
    }

    #[test]
    fn bigint_bounds() {
        assert_eq!(to_db(7, "quantity").ok(), Some(7));
        assert!(matches!(to_db(u64::MAX, "quantity"), Err(DbError::OutOfRange("quantity"))));
        assert_eq!(from_db(7, "quantity").ok(), Some(7));
        assert!(matches!(from_db(-1, "quantity"), Err(DbError::Corrupt(_))));
    }
}
