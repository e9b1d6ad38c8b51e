mod common;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tripj::{
    clock::Clock,
    error::AppError,
    models::{
        country::Country,
        lifecycle::ArchiveSeq,
        trip::{CountryId, Trip, TripId, UserId},
    },
    services::{
        store::{StoreError, TripStore},
        trips::TripService,
    },
};

use common::{date, osaka, TestEnv};

fn codes(trips: &[Trip]) -> Vec<String> {
    trips.iter().map(Trip::archive_code).collect()
}

#[tokio::test]
async fn sweep_twice_transitions_nothing_new() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;
    for user in 1..=3 {
        env.trips
            .create_trip(osaka("2024-03-01", "2024-03-14"), None, UserId(user))
            .await?;
    }
    // Still running: ends after today.
    env.trips
        .create_trip(osaka("2024-03-01", "2024-03-30"), None, UserId(4))
        .await?;

    let first = env.trips.force_sweep().await?;
    assert_eq!(first.eligible, 3);
    assert_eq!(first.archived, 3);

    let second = env.trips.force_sweep().await?;
    assert_eq!(second.eligible, 0);
    assert_eq!(second.archived, 0);

    for user in 1..=3 {
        assert_eq!(codes(&env.trips.get_past_trips(UserId(user)).await?), ["B01"]);
    }
    assert!(env.trips.get_current_trip(UserId(4)).await?.is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_issue_each_code_once() -> anyhow::Result<()> {
    const USERS: i64 = 12;
    const ROUNDS: u32 = 4;
    const SWEEPERS: usize = 6;

    let env = TestEnv::new(date("2024-01-01")).await?;
    let mut archived_total = 0;

    for _ in 0..ROUNDS {
        let today = env.clock.today().format("%Y-%m-%d").to_string();
        for user in 1..=USERS {
            env.trips
                .create_trip(osaka(&today, &today), None, UserId(user))
                .await?;
        }
        env.clock.advance_days(1);

        let mut handles = Vec::new();
        for _ in 0..SWEEPERS {
            let trips = env.trips.clone();
            handles.push(tokio::spawn(async move { trips.force_sweep().await }));
        }
        for handle in handles {
            archived_total += handle.await??.archived;
        }
        // Anything deferred by lock contention is picked up by the next run.
        archived_total += env.trips.force_sweep().await?.archived;
    }

    assert_eq!(archived_total, (USERS as usize) * (ROUNDS as usize));
    let expected: Vec<String> = (1..=ROUNDS)
        .map(|n| ArchiveSeq::new(n).unwrap().to_string())
        .collect();
    for user in 1..=USERS {
        let past = env.trips.get_past_trips(UserId(user)).await?;
        assert_eq!(codes(&past), expected, "user {user}");
        assert!(env.trips.get_current_trip(UserId(user)).await?.is_none());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_leave_one_active_trip() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let trips = env.trips.clone();
        handles.push(tokio::spawn(async move {
            trips
                .create_trip(osaka("2024-03-10", "2024-03-20"), None, UserId(1))
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(created, 1);
    Ok(())
}

/// Delegates to SQLite but can fail archive writes for chosen trips or hand
/// out every eligible trip twice.
struct ScriptedStore {
    inner: Arc<dyn TripStore>,
    failing: Mutex<HashSet<TripId>>,
    duplicate_eligible: AtomicBool,
}

impl ScriptedStore {
    fn new(inner: Arc<dyn TripStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            duplicate_eligible: AtomicBool::new(false),
        }
    }

    fn fail_archive(&self, id: TripId) {
        self.failing.lock().unwrap().insert(id);
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl TripStore for ScriptedStore {
    async fn find_active_trip_by_user(&self, user_id: UserId) -> Result<Option<Trip>, StoreError> {
        self.inner.find_active_trip_by_user(user_id).await
    }

    async fn find_trip_by_id(&self, id: TripId) -> Result<Option<Trip>, StoreError> {
        self.inner.find_trip_by_id(id).await
    }

    async fn find_archived_trips_by_user(&self, user_id: UserId) -> Result<Vec<Trip>, StoreError> {
        self.inner.find_archived_trips_by_user(user_id).await
    }

    async fn find_eligible_for_sweep(&self, as_of: NaiveDate) -> Result<Vec<Trip>, StoreError> {
        let mut trips = self.inner.find_eligible_for_sweep(as_of).await?;
        if self.duplicate_eligible.load(Ordering::SeqCst) {
            let again = trips.clone();
            trips.extend(again);
        }
        Ok(trips)
    }

    async fn save(&self, trip: &Trip) -> Result<Trip, StoreError> {
        self.inner.save(trip).await
    }

    async fn max_archived_sequence(&self, user_id: UserId) -> Result<u32, StoreError> {
        self.inner.max_archived_sequence(user_id).await
    }

    async fn archive_if_active(
        &self,
        id: TripId,
        user_id: UserId,
        expected_max: u32,
        next: ArchiveSeq,
        at: DateTime<Utc>,
    ) -> Result<Option<Trip>, StoreError> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner
            .archive_if_active(id, user_id, expected_max, next, at)
            .await
    }

    async fn find_country(&self, id: CountryId) -> Result<Option<Country>, StoreError> {
        self.inner.find_country(id).await
    }
}

#[tokio::test]
async fn failing_trip_is_deferred_without_blocking_others() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;
    let scripted = Arc::new(ScriptedStore::new(env.store.clone()));
    let service = TripService::new(scripted.clone(), env.clock.clone());

    let mut created = Vec::new();
    for user in 1..=3 {
        created.push(
            service
                .create_trip(osaka("2024-03-01", "2024-03-14"), None, UserId(user))
                .await?,
        );
    }
    scripted.fail_archive(created[1].id);

    let report = service.force_sweep().await?;
    assert_eq!(report.archived, 2);
    assert_eq!(report.deferred, 1);
    assert_eq!(codes(&service.get_past_trips(UserId(1)).await?), ["B01"]);
    assert!(service.get_past_trips(UserId(2)).await?.is_empty());
    assert_eq!(codes(&service.get_past_trips(UserId(3)).await?), ["B01"]);

    scripted.heal();
    let retry = service.force_sweep().await?;
    assert_eq!(retry.archived, 1);
    assert_eq!(retry.deferred, 0);
    assert_eq!(codes(&service.get_past_trips(UserId(2)).await?), ["B01"]);
    Ok(())
}

#[tokio::test]
async fn duplicated_eligible_rows_are_archived_once() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;
    let scripted = Arc::new(ScriptedStore::new(env.store.clone()));
    scripted.duplicate_eligible.store(true, Ordering::SeqCst);
    let service = TripService::new(scripted.clone(), env.clock.clone());

    service
        .create_trip(osaka("2024-03-01", "2024-03-14"), None, UserId(1))
        .await?;

    let report = service.force_sweep().await?;
    assert_eq!(report.eligible, 2);
    assert_eq!(report.archived, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(codes(&service.get_past_trips(UserId(1)).await?), ["B01"]);
    Ok(())
}

#[tokio::test]
async fn store_errors_surface_untranslated_to_callers() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;
    env.pool.close().await;

    let err = env
        .trips
        .get_current_trip(UserId(1))
        .await
        .expect_err("closed pool must fail");
    assert!(matches!(err, AppError::Store(StoreError::Database(_))), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn trip_ending_today_waits_for_tomorrow() -> anyhow::Result<()> {
    let env = TestEnv::new(date("2024-03-15")).await?;
    let trip = env
        .trips
        .create_trip(osaka("2024-03-01", "2024-03-15"), None, UserId(1))
        .await?;

    assert_eq!(env.trips.force_sweep().await?.archived, 0);
    // Still unexpired, so a second trip conflicts.
    let err = env
        .trips
        .create_trip(osaka("2024-03-16", "2024-03-20"), None, UserId(1))
        .await
        .expect_err("second active trip");
    assert!(matches!(err, AppError::Conflict(_)));

    env.clock.advance_days(1);
    assert_eq!(env.trips.force_sweep().await?.archived, 1);
    let stored = env.store.find_trip_by_id(trip.id).await?.expect("trip");
    assert_eq!(stored.archive_code(), "B01");
    assert_eq!(stored.trip_name, trip.trip_name);
    Ok(())
}
