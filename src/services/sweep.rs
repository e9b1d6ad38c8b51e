//! Daily sweep that archives trips whose end date has passed.
//!
//! Each trip is archived in its own compare-and-set step against the store,
//! so a failure for one trip never blocks or rolls back another, and running
//! the sweep again (or twice at once) cannot renumber an archived trip.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    models::trip::{Trip, UserId},
    services::{
        sequencer::CodeSequencer,
        store::{StoreError, TripStore},
    },
};

/// Lost compare-and-set races tolerated for one trip within a single run.
const MAX_ARCHIVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Trips returned by the eligibility query.
    pub eligible: usize,
    /// Trips this run moved to archived.
    pub archived: usize,
    /// Trips that turned out to be archived, missing, or not yet ended.
    pub skipped: usize,
    /// Trips left for the next run after a store error or contention.
    pub deferred: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived(Trip),
    Skipped,
    Contended,
}

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn TripStore>,
    sequencer: CodeSequencer,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(store: Arc<dyn TripStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sequencer: CodeSequencer::new(store.clone()),
            store,
            clock,
        }
    }

    /// One full pass over every eligible trip as of the clock's today.
    ///
    /// Only a failing eligibility query is returned as an error; per-trip
    /// failures are logged and counted as deferred.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let today = self.clock.today();
        let eligible = self.store.find_eligible_for_sweep(today).await?;
        let mut report = SweepReport {
            eligible: eligible.len(),
            ..SweepReport::default()
        };

        let mut by_user: BTreeMap<UserId, Vec<Trip>> = BTreeMap::new();
        for trip in eligible {
            by_user.entry(trip.user_id).or_default().push(trip);
        }

        for (user_id, mut trips) in by_user {
            if trips.len() > 1 {
                warn!(%user_id, count = trips.len(), "user holds several active trips, archiving oldest first");
            }
            trips.sort_by(|a, b| {
                a.end_date
                    .cmp(&b.end_date)
                    .then(a.start_date.cmp(&b.start_date))
                    .then(a.created_at.cmp(&b.created_at))
            });

            for trip in trips {
                match self.archive_trip(&trip, today).await {
                    Ok(ArchiveOutcome::Archived(archived)) => {
                        report.archived += 1;
                        info!(
                            %user_id,
                            trip_id = %archived.id,
                            archive_code = %archived.lifecycle_marker,
                            "trip archived"
                        );
                    }
                    Ok(ArchiveOutcome::Skipped) => report.skipped += 1,
                    Ok(ArchiveOutcome::Contended) => {
                        report.deferred += 1;
                        warn!(%user_id, trip_id = %trip.id, "archive sequence contended, deferring trip to next run");
                    }
                    Err(err) => {
                        report.deferred += 1;
                        warn!(%user_id, trip_id = %trip.id, error = %err, "archiving failed, deferring trip to next run");
                    }
                }
            }
        }

        info!(
            %today,
            eligible = report.eligible,
            archived = report.archived,
            skipped = report.skipped,
            deferred = report.deferred,
            "sweep finished"
        );
        Ok(report)
    }

    /// Archives a single trip if it is still eligible on `today`.
    ///
    /// The trip is re-read before every attempt, so a stale snapshot from the
    /// eligibility query never leads to a double archive.
    pub async fn archive_trip(
        &self,
        trip: &Trip,
        today: NaiveDate,
    ) -> Result<ArchiveOutcome, StoreError> {
        for attempt in 1..=MAX_ARCHIVE_ATTEMPTS {
            let Some(current) = self.store.find_trip_by_id(trip.id).await? else {
                debug!(trip_id = %trip.id, "trip vanished before archiving");
                return Ok(ArchiveOutcome::Skipped);
            };

            let allocation = self.sequencer.next(current.user_id).await?;
            if let Err(reason) =
                current
                    .lifecycle_marker
                    .archive(current.end_date, today, allocation.next)
            {
                debug!(trip_id = %current.id, %reason, "trip not archivable");
                return Ok(ArchiveOutcome::Skipped);
            }

            let archived = self
                .store
                .archive_if_active(
                    current.id,
                    current.user_id,
                    allocation.expected_max,
                    allocation.next,
                    self.clock.now(),
                )
                .await?;
            if let Some(archived) = archived {
                return Ok(ArchiveOutcome::Archived(archived));
            }
            debug!(trip_id = %current.id, attempt, "archive compare-and-set lost, retrying");
        }
        Ok(ArchiveOutcome::Contended)
    }
}

/// Time from `now` until the next `at` (local wall-clock), never zero: a run
/// scheduled for exactly `now` is pushed to the following day.
pub fn until_next_run(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today_run = now.date().and_time(at);
    let next = if today_run > now {
        today_run
    } else {
        today_run
            .checked_add_days(Days::new(1))
            .unwrap_or(today_run)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Runs the sweep once a day at local time `at`, until the task is aborted.
pub fn spawn_daily(sweeper: Sweeper, at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = until_next_run(Local::now().naive_local(), at);
            debug!(seconds = delay.as_secs(), "next sweep scheduled");
            tokio::time::sleep(delay).await;
            if let Err(err) = sweeper.sweep().await {
                error!(error = %err, "sweep could not query eligible trips, retrying at next run");
            }
        }
    })
}
