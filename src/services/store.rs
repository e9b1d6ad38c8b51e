//! Trip persistence.
//!
//! [`TripStore`] is the only shared mutable resource of the lifecycle core.
//! Callers hold identifiers, never live rows: every operation reads or writes
//! through the store, and nothing is cached between calls.
//!
//! [`SqliteTripStore`] backs the trait with SQLite. Two unique indexes act as
//! the last line of defence for the lifecycle invariants:
//!
//! - `(user_id, archive_seq)`: an archive code is never issued twice per user.
//! - `user_id WHERE archive_seq IS NULL`: at most one active trip per user.
//!
//! Violations of either surface as [`StoreError::Duplicate`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use thiserror::Error;

use crate::{
    db::DbPool,
    models::{
        country::Country,
        lifecycle::{ArchiveSeq, LifecycleMarker},
        trip::{CountryId, Trip, TripId, UserId},
    },
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the statement failed. Transient from
    /// the caller's point of view.
    #[error("trip store unavailable: {0}")]
    Database(sqlx::Error),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("corrupt trip record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("archive sequence exhausted after {0}")]
    SequenceExhausted(u32),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

#[async_trait]
pub trait TripStore: Send + Sync {
    /// The user's trip that is still marked active, if any.
    async fn find_active_trip_by_user(&self, user_id: UserId) -> Result<Option<Trip>, StoreError>;

    async fn find_trip_by_id(&self, id: TripId) -> Result<Option<Trip>, StoreError>;

    /// Archived trips of a user, oldest archive code first.
    async fn find_archived_trips_by_user(&self, user_id: UserId) -> Result<Vec<Trip>, StoreError>;

    /// All active trips whose end date is strictly before `as_of`.
    async fn find_eligible_for_sweep(&self, as_of: NaiveDate) -> Result<Vec<Trip>, StoreError>;

    /// Inserts the trip, or overwrites the mutable fields of an existing one.
    /// The lifecycle marker of an existing trip is never changed here.
    async fn save(&self, trip: &Trip) -> Result<Trip, StoreError>;

    /// Highest archive sequence issued to the user, 0 if none.
    async fn max_archived_sequence(&self, user_id: UserId) -> Result<u32, StoreError>;

    /// Compare-and-set archive step. Marks the trip `ARCHIVED(next)` only if
    /// it is still active and the user's highest sequence still equals
    /// `expected_max`. Returns `None` when either condition no longer holds.
    async fn archive_if_active(
        &self,
        id: TripId,
        user_id: UserId,
        expected_max: u32,
        next: ArchiveSeq,
        at: DateTime<Utc>,
    ) -> Result<Option<Trip>, StoreError>;

    async fn find_country(&self, id: CountryId) -> Result<Option<Country>, StoreError>;
}

macro_rules! trip_columns {
    () => {
        "id, user_id, country_id, start_date, end_date, trip_name, purpose, archive_seq, created_at, updated_at"
    };
}

#[derive(FromRow)]
struct TripRow {
    id: TripId,
    user_id: UserId,
    country_id: CountryId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    trip_name: Option<String>,
    purpose: Option<String>,
    archive_seq: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let lifecycle_marker = match row.archive_seq {
            None => LifecycleMarker::Active,
            Some(raw) => u32::try_from(raw)
                .ok()
                .and_then(ArchiveSeq::new)
                .map(LifecycleMarker::Archived)
                .ok_or_else(|| StoreError::Corrupt {
                    id: row.id.to_string(),
                    reason: format!("invalid archive sequence {raw}"),
                })?,
        };
        Ok(Trip {
            id: row.id,
            user_id: row.user_id,
            country_id: row.country_id,
            start_date: row.start_date,
            end_date: row.end_date,
            trip_name: row.trip_name,
            purpose: row.purpose,
            lifecycle_marker,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_trips(rows: Vec<TripRow>) -> Result<Vec<Trip>, StoreError> {
    rows.into_iter().map(Trip::try_from).collect()
}

fn seq_param(marker: LifecycleMarker) -> Option<i64> {
    marker.archive_seq().map(|seq| i64::from(seq.get()))
}

#[derive(Clone)]
pub struct SqliteTripStore {
    pool: DbPool,
}

impl SqliteTripStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripStore for SqliteTripStore {
    async fn find_active_trip_by_user(&self, user_id: UserId) -> Result<Option<Trip>, StoreError> {
        let row = sqlx::query_as::<_, TripRow>(concat!(
            "SELECT ",
            trip_columns!(),
            " FROM trips WHERE user_id = ? AND archive_seq IS NULL ORDER BY created_at LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn find_trip_by_id(&self, id: TripId) -> Result<Option<Trip>, StoreError> {
        let row = sqlx::query_as::<_, TripRow>(concat!(
            "SELECT ",
            trip_columns!(),
            " FROM trips WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn find_archived_trips_by_user(&self, user_id: UserId) -> Result<Vec<Trip>, StoreError> {
        let rows = sqlx::query_as::<_, TripRow>(concat!(
            "SELECT ",
            trip_columns!(),
            " FROM trips WHERE user_id = ? AND archive_seq IS NOT NULL ORDER BY archive_seq ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_trips(rows)
    }

    async fn find_eligible_for_sweep(&self, as_of: NaiveDate) -> Result<Vec<Trip>, StoreError> {
        let rows = sqlx::query_as::<_, TripRow>(concat!(
            "SELECT ",
            trip_columns!(),
            " FROM trips WHERE archive_seq IS NULL AND end_date < ?",
            " ORDER BY user_id, end_date, start_date, created_at"
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        into_trips(rows)
    }

    async fn save(&self, trip: &Trip) -> Result<Trip, StoreError> {
        let row = sqlx::query_as::<_, TripRow>(concat!(
            "INSERT INTO trips (",
            trip_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            " ON CONFLICT (id) DO UPDATE SET",
            " country_id = excluded.country_id,",
            " start_date = excluded.start_date,",
            " end_date = excluded.end_date,",
            " trip_name = excluded.trip_name,",
            " purpose = excluded.purpose,",
            " updated_at = excluded.updated_at",
            " RETURNING ",
            trip_columns!()
        ))
        .bind(trip.id)
        .bind(trip.user_id)
        .bind(trip.country_id)
        .bind(trip.start_date)
        .bind(trip.end_date)
        .bind(trip.trip_name.as_deref())
        .bind(trip.purpose.as_deref())
        .bind(seq_param(trip.lifecycle_marker))
        .bind(trip.created_at)
        .bind(trip.updated_at)
        // RETURNING writes must be stepped to completion on SQLite, so no
        // fetch_one/fetch_optional here.
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;
        Trip::try_from(row)
    }

    async fn max_archived_sequence(&self, user_id: UserId) -> Result<u32, StoreError> {
        let max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(archive_seq), 0) FROM trips WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        u32::try_from(max).map_err(|_| StoreError::Corrupt {
            id: format!("user {user_id}"),
            reason: format!("archive sequence {max} out of range"),
        })
    }

    async fn archive_if_active(
        &self,
        id: TripId,
        user_id: UserId,
        expected_max: u32,
        next: ArchiveSeq,
        at: DateTime<Utc>,
    ) -> Result<Option<Trip>, StoreError> {
        // A single statement, so SQLite's write lock covers both the
        // sequence check and the write. Drained with fetch_all like `save`.
        let row = sqlx::query_as::<_, TripRow>(concat!(
            "UPDATE trips SET archive_seq = ?, updated_at = ?",
            " WHERE id = ? AND user_id = ? AND archive_seq IS NULL",
            " AND (SELECT COALESCE(MAX(archive_seq), 0) FROM trips WHERE user_id = ?) = ?",
            " RETURNING ",
            trip_columns!()
        ))
        .bind(i64::from(next.get()))
        .bind(at)
        .bind(id)
        .bind(user_id)
        .bind(user_id)
        .bind(i64::from(expected_max))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .next();
        row.map(Trip::try_from).transpose()
    }

    async fn find_country(&self, id: CountryId) -> Result<Option<Country>, StoreError> {
        let country =
            sqlx::query_as::<_, Country>("SELECT id, name, code FROM countries WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(country)
    }
}
