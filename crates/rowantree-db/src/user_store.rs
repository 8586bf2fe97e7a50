//! `PostgreSQL` implementation of the [`UserRepository`] port.
//!
//! An aggregate is spread over five tables (`users`, `user_stores`,
//! `user_incomes`, `user_features`, `user_population`) and its journal over
//! `ledger_journal`. Every write runs in one transaction:
//!
//! ```text
//! BEGIN
//!   UPDATE users ... WHERE version = $expected   -- optimistic check
//!   upsert child rows via UNNEST, delete stale keys
//!   INSERT INTO ledger_journal via UNNEST
//! COMMIT
//! ```
//!
//! A version mismatch aborts before any child row is touched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rowantree_core::{RepoFuture, RepositoryError, UserRepository, WorldTotals};
use rowantree_types::{
    FeatureId, FeatureState, IncomeSource, LedgerEntry, Store, TierId, UserAggregate, UserId,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{DbError, from_db, to_db};

/// User aggregates in `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a repository over a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user and its child rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UserExists`] if the id is taken.
    pub async fn insert(&self, aggregate: &UserAggregate) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"INSERT INTO users (user_id, active, version)
              VALUES ($1, $2, $3)
              ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(aggregate.user_id.into_inner())
        .bind(aggregate.active)
        .bind(to_db(aggregate.version, "version")?)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(DbError::UserExists(aggregate.user_id));
        }

        write_children(&mut tx, aggregate).await?;
        tx.commit().await?;

        tracing::debug!(user_id = %aggregate.user_id, "Inserted user");
        Ok(())
    }

    /// Load a user's aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UserNotFound`] if there is no such user, or
    /// [`DbError::Corrupt`] if a stored store name is not recognised.
    pub async fn load(&self, user_id: UserId) -> Result<UserAggregate, DbError> {
        let id = user_id.into_inner();

        let user = sqlx::query_as::<_, UserRow>(
            r"SELECT active, version FROM users WHERE user_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::UserNotFound(user_id))?;

        let store_rows = sqlx::query_as::<_, StoreRow>(
            r"SELECT store, quantity FROM user_stores WHERE user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let income_rows = sqlx::query_as::<_, IncomeRow>(
            r"SELECT store, rate, enabled FROM user_incomes WHERE user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let feature_rows = sqlx::query_as::<_, FeatureRow>(
            r"SELECT feature_id, active, detail, activated_at FROM user_features WHERE user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let population_rows = sqlx::query_as::<_, PopulationRow>(
            r"SELECT tier_id, head_count FROM user_population WHERE user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut aggregate = UserAggregate::new(user_id);
        aggregate.active = user.active;
        aggregate.version = from_db(user.version, "version")?;

        for row in store_rows {
            aggregate
                .stores
                .insert(parse_store(&row.store)?, from_db(row.quantity, "quantity")?);
        }
        for row in income_rows {
            aggregate.incomes.insert(
                parse_store(&row.store)?,
                IncomeSource {
                    rate: from_db(row.rate, "rate")?,
                    enabled: row.enabled,
                },
            );
        }
        aggregate.features = feature_rows
            .into_iter()
            .map(|row| {
                (
                    FeatureId::from(row.feature_id),
                    FeatureState {
                        active: row.active,
                        detail: row.detail,
                        activated_at: row.activated_at,
                    },
                )
            })
            .collect();
        for row in population_rows {
            aggregate
                .population
                .insert(TierId::from(row.tier_id), from_db(row.head_count, "head count")?);
        }

        Ok(aggregate)
    }

    /// Save an aggregate and append its journal.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::VersionConflict`] if the stored version moved on,
    /// or [`DbError::UserNotFound`] if the user is gone.
    pub async fn save(
        &self,
        aggregate: &UserAggregate,
        journal: &[LedgerEntry],
    ) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;

        let bumped: Option<i64> = sqlx::query_scalar(
            r"UPDATE users
              SET active = $2, version = version + 1, updated_at = now()
              WHERE user_id = $1 AND version = $3
              RETURNING version",
        )
        .bind(aggregate.user_id.into_inner())
        .bind(aggregate.active)
        .bind(to_db(aggregate.version, "version")?)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = bumped else {
            let exists: bool =
                sqlx::query_scalar(r"SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
                    .bind(aggregate.user_id.into_inner())
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                DbError::VersionConflict {
                    user_id: aggregate.user_id,
                    expected: aggregate.version,
                }
            } else {
                DbError::UserNotFound(aggregate.user_id)
            });
        };

        write_children(&mut tx, aggregate).await?;
        insert_journal(&mut tx, journal).await?;
        tx.commit().await?;

        tracing::debug!(
            user_id = %aggregate.user_id,
            version,
            journal_lines = journal.len(),
            "Saved user"
        );
        from_db(version, "version")
    }

    /// Delete a user; child rows and queue entries cascade.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UserNotFound`] if there is no such user.
    pub async fn delete(&self, user_id: UserId) -> Result<(), DbError> {
        let deleted = sqlx::query(r"DELETE FROM users WHERE user_id = $1")
            .bind(user_id.into_inner())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(DbError::UserNotFound(user_id));
        }
        Ok(())
    }

    /// Ids of every active user, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn active_ids(&self) -> Result<Vec<UserId>, DbError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar(r"SELECT user_id FROM users WHERE active ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }

    /// Active user count and population summed over active users.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn totals(&self) -> Result<WorldTotals, DbError> {
        let (active_users, population): (i64, i64) = sqlx::query_as(
            r"SELECT COUNT(*) AS active_users,
                     COALESCE(SUM(p.total), 0)::BIGINT AS total_population
              FROM users u
              LEFT JOIN (
                  SELECT user_id, SUM(head_count) AS total
                  FROM user_population
                  GROUP BY user_id
              ) p ON p.user_id = u.user_id
              WHERE u.active",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(WorldTotals {
            active_user_count: from_db(active_users, "active user count")?,
            total_population: from_db(population, "total population")?,
        })
    }

    /// Every journal line stored for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn journal(&self, user_id: UserId) -> Result<Vec<JournalRow>, DbError> {
        let rows = sqlx::query_as::<_, JournalRow>(
            r"SELECT id, store, direction, quantity, reason, reference, created_at
              FROM ledger_journal
              WHERE user_id = $1
              ORDER BY created_at, id",
        )
        .bind(user_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl UserRepository for PostgresUserRepository {
    fn insert_user<'a>(&'a self, aggregate: &'a UserAggregate) -> RepoFuture<'a, ()> {
        async move { self.insert(aggregate).await.map_err(RepositoryError::from) }.boxed()
    }

    fn load_user(&self, user_id: UserId) -> RepoFuture<'_, UserAggregate> {
        async move { self.load(user_id).await.map_err(RepositoryError::from) }.boxed()
    }

    fn save_user<'a>(
        &'a self,
        aggregate: &'a UserAggregate,
        journal: &'a [LedgerEntry],
    ) -> RepoFuture<'a, u64> {
        async move {
            self.save(aggregate, journal)
                .await
                .map_err(RepositoryError::from)
        }
        .boxed()
    }

    fn delete_user(&self, user_id: UserId) -> RepoFuture<'_, ()> {
        async move { self.delete(user_id).await.map_err(RepositoryError::from) }.boxed()
    }

    fn list_active_user_ids(&self) -> RepoFuture<'_, Vec<UserId>> {
        async move { self.active_ids().await.map_err(RepositoryError::from) }.boxed()
    }

    fn world_totals(&self) -> RepoFuture<'_, WorldTotals> {
        async move { self.totals().await.map_err(RepositoryError::from) }.boxed()
    }
}

// ---------------------------------------------------------------------------
// Child rows
// ---------------------------------------------------------------------------

async fn write_children(
    tx: &mut Transaction<'_, Postgres>,
    aggregate: &UserAggregate,
) -> Result<(), DbError> {
    let id = aggregate.user_id.into_inner();

    let (stores, quantities) = split_counts(&aggregate.stores, |s| s.as_str().to_owned(), "quantity")?;
    sqlx::query(
        r"INSERT INTO user_stores (user_id, store, quantity)
          SELECT $1, * FROM UNNEST($2::TEXT[], $3::BIGINT[])
          ON CONFLICT (user_id, store) DO UPDATE SET quantity = EXCLUDED.quantity",
    )
    .bind(id)
    .bind(&stores)
    .bind(&quantities)
    .execute(&mut **tx)
    .await?;
    delete_stale(tx, "user_stores", "store", id, &stores).await?;

    let mut income_stores = Vec::with_capacity(aggregate.incomes.len());
    let mut rates = Vec::with_capacity(aggregate.incomes.len());
    let mut enabled = Vec::with_capacity(aggregate.incomes.len());
    for (store, source) in &aggregate.incomes {
        income_stores.push(store.as_str().to_owned());
        rates.push(to_db(source.rate, "rate")?);
        enabled.push(source.enabled);
    }
    sqlx::query(
        r"INSERT INTO user_incomes (user_id, store, rate, enabled)
          SELECT $1, * FROM UNNEST($2::TEXT[], $3::BIGINT[], $4::BOOLEAN[])
          ON CONFLICT (user_id, store) DO UPDATE
          SET rate = EXCLUDED.rate, enabled = EXCLUDED.enabled",
    )
    .bind(id)
    .bind(&income_stores)
    .bind(&rates)
    .bind(&enabled)
    .execute(&mut **tx)
    .await?;
    delete_stale(tx, "user_incomes", "store", id, &income_stores).await?;

    let mut feature_ids = Vec::with_capacity(aggregate.features.len());
    let mut actives = Vec::with_capacity(aggregate.features.len());
    let mut details: Vec<Option<String>> = Vec::with_capacity(aggregate.features.len());
    let mut activated: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(aggregate.features.len());
    for (feature, state) in &aggregate.features {
        feature_ids.push(feature.as_str().to_owned());
        actives.push(state.active);
        details.push(state.detail.clone());
        activated.push(state.activated_at);
    }
    sqlx::query(
        r"INSERT INTO user_features (user_id, feature_id, active, detail, activated_at)
          SELECT $1, * FROM UNNEST($2::TEXT[], $3::BOOLEAN[], $4::TEXT[], $5::TIMESTAMPTZ[])
          ON CONFLICT (user_id, feature_id) DO UPDATE
          SET active = EXCLUDED.active,
              detail = EXCLUDED.detail,
              activated_at = EXCLUDED.activated_at",
    )
    .bind(id)
    .bind(&feature_ids)
    .bind(&actives)
    .bind(&details)
    .bind(&activated)
    .execute(&mut **tx)
    .await?;
    delete_stale(tx, "user_features", "feature_id", id, &feature_ids).await?;

    let (tiers, counts) =
        split_counts(&aggregate.population, |t| t.as_str().to_owned(), "head count")?;
    sqlx::query(
        r"INSERT INTO user_population (user_id, tier_id, head_count)
          SELECT $1, * FROM UNNEST($2::TEXT[], $3::BIGINT[])
          ON CONFLICT (user_id, tier_id) DO UPDATE SET head_count = EXCLUDED.head_count",
    )
    .bind(id)
    .bind(&tiers)
    .bind(&counts)
    .execute(&mut **tx)
    .await?;
    delete_stale(tx, "user_population", "tier_id", id, &tiers).await?;

    Ok(())
}

/// Remove child rows whose key is no longer in the aggregate.
///
/// `table` and `key` are compile-time constants from this module.
async fn delete_stale(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    key: &'static str,
    user_id: Uuid,
    keep: &[String],
) -> Result<(), DbError> {
    let statement = format!("DELETE FROM {table} WHERE user_id = $1 AND NOT ({key} = ANY($2))");
    sqlx::query(&statement)
        .bind(user_id)
        .bind(keep)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_journal(
    tx: &mut Transaction<'_, Postgres>,
    journal: &[LedgerEntry],
) -> Result<(), DbError> {
    if journal.is_empty() {
        return Ok(());
    }

    let len = journal.len();
    let mut ids = Vec::with_capacity(len);
    let mut users = Vec::with_capacity(len);
    let mut stores = Vec::with_capacity(len);
    let mut directions = Vec::with_capacity(len);
    let mut quantities = Vec::with_capacity(len);
    let mut reasons = Vec::with_capacity(len);
    let mut references: Vec<Option<String>> = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);

    for entry in journal {
        ids.push(entry.id.into_inner());
        users.push(entry.user_id.into_inner());
        stores.push(entry.store.as_str().to_owned());
        directions.push(entry.direction.as_str().to_owned());
        quantities.push(to_db(entry.quantity, "quantity")?);
        reasons.push(entry.reason.as_str().to_owned());
        references.push(entry.reference.clone());
        timestamps.push(entry.created_at);
    }

    sqlx::query(
        r"INSERT INTO ledger_journal (id, user_id, store, direction, quantity, reason, reference, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::TEXT[], $4::TEXT[], $5::BIGINT[], $6::TEXT[], $7::TEXT[], $8::TIMESTAMPTZ[])",
    )
    .bind(&ids)
    .bind(&users)
    .bind(&stores)
    .bind(&directions)
    .bind(&quantities)
    .bind(&reasons)
    .bind(&references)
    .bind(&timestamps)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn split_counts<K>(
    map: &BTreeMap<K, u64>,
    name: impl Fn(&K) -> String,
    what: &'static str,
) -> Result<(Vec<String>, Vec<i64>), DbError> {
    let mut keys = Vec::with_capacity(map.len());
    let mut values = Vec::with_capacity(map.len());
    for (key, value) in map {
        keys.push(name(key));
        values.push(to_db(*value, what)?);
    }
    Ok((keys, values))
}

fn parse_store(name: &str) -> Result<Store, DbError> {
    name.parse()
        .map_err(|e| DbError::Corrupt(format!("stored store name: {e}")))
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    active: bool,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct StoreRow {
    store: String,
    quantity: i64,
}

#[derive(sqlx::FromRow)]
struct IncomeRow {
    store: String,
    rate: i64,
    enabled: bool,
}

#[derive(sqlx::FromRow)]
struct FeatureRow {
    feature_id: String,
    active: bool,
    detail: Option<String>,
    activated_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct PopulationRow {
    tier_id: String,
    head_count: i64,
}

/// A row from the `ledger_journal` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalRow {
    /// Journal line id.
    pub id: Uuid,
    /// Store name.
    pub store: String,
    /// `credit` or `debit`.
    pub direction: String,
    /// Quantity moved.
    pub quantity: i64,
    /// Reason name.
    pub reason: String,
    /// Related rule entry.
    pub reference: Option<String>,
    /// When the movement was applied.
    pub created_at: DateTime<Utc>,
}
