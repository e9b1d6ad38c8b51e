#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tempfile::TempDir;
use tripj::{
    clock::ManualClock,
    db::{init_pool, migrate, DbPool},
    models::trip::{CountryId, TripDetails},
    services::{store::SqliteTripStore, trips::TripService},
};

pub const JAPAN: CountryId = CountryId(1);
pub const HONG_KONG: CountryId = CountryId(2);

/// A migrated SQLite file in a temp dir plus a service on a manual clock.
pub struct TestEnv {
    pub pool: DbPool,
    pub store: Arc<SqliteTripStore>,
    pub clock: Arc<ManualClock>,
    pub trips: TripService,
    _root: TempDir,
}

impl TestEnv {
    pub async fn new(today: NaiveDate) -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for trip store")?;
        let db_path = root.path().join("trips.sqlite");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let pool = init_pool(&database_url, 5).await?;
        migrate(&pool).await?;

        let store = Arc::new(SqliteTripStore::new(pool.clone()));
        let clock = Arc::new(ManualClock::new(today));
        let trips = TripService::new(store.clone(), clock.clone());
        Ok(Self {
            pool,
            store,
            clock,
            trips,
            _root: root,
        })
    }
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date in YYYY-MM-DD form")
}

pub fn osaka(start: &str, end: &str) -> TripDetails {
    TripDetails::new(JAPAN, date(start), date(end))
        .named("Osaka getaway")
        .with_purpose("travel")
}
