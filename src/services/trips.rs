use std::{collections::BTreeMap, sync::Arc};

use tracing::{info, warn};

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        lifecycle::{ArchiveSeq, LifecycleMarker},
        trip::{CountryId, Trip, TripDetails, TripId, TripView, UserId},
    },
    services::{
        store::{StoreError, TripStore},
        sweep::{ArchiveOutcome, SweepReport, Sweeper},
    },
};

pub const ACTIVE_TRIP_EXISTS: &str = "an active trip already exists";

/// Entry point for everything callers do with trips.
///
/// Enforces "one active trip per user" and date ordering before anything is
/// written; lifecycle transitions are delegated to the [`Sweeper`].
#[derive(Clone)]
pub struct TripService {
    store: Arc<dyn TripStore>,
    clock: Arc<dyn Clock>,
    sweeper: Sweeper,
}

impl TripService {
    pub fn new(store: Arc<dyn TripStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sweeper: Sweeper::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    /// Creates a trip for `user_id`.
    ///
    /// `marker` is normally `None` (a new active trip). Passing an archived
    /// marker backfills a historical trip; it must be the user's next code.
    pub async fn create_trip(
        &self,
        details: TripDetails,
        marker: Option<LifecycleMarker>,
        user_id: UserId,
    ) -> Result<Trip, AppError> {
        let details = self.validate(details).await?;
        let today = self.clock.today();

        if let Some(active) = self.store.find_active_trip_by_user(user_id).await? {
            if active.end_date >= today {
                return Err(AppError::Conflict(ACTIVE_TRIP_EXISTS.into()));
            }
            // Ended but not swept yet: archive it now so the new trip does
            // not make two active trips.
            match self.sweeper.archive_trip(&active, today).await? {
                ArchiveOutcome::Archived(archived) => info!(
                    %user_id,
                    trip_id = %archived.id,
                    archive_code = %archived.lifecycle_marker,
                    "archived ended trip ahead of new trip"
                ),
                ArchiveOutcome::Skipped => {}
                ArchiveOutcome::Contended => {
                    return Err(AppError::Conflict(
                        "previous trip is being archived, try again".into(),
                    ))
                }
            }
        }

        let mut trip = Trip::new(user_id, details, self.clock.now());
        if let Some(LifecycleMarker::Archived(seq)) = marker {
            let max = self.store.max_archived_sequence(user_id).await?;
            let next = ArchiveSeq::after(max);
            if next != Some(seq) {
                return Err(AppError::Validation(format!(
                    "archive code {seq} is out of sequence, next is {}",
                    next.map(|next| next.to_string()).unwrap_or_default()
                )));
            }
            trip.lifecycle_marker = LifecycleMarker::Archived(seq);
        }

        let saved = self.store.save(&trip).await.map_err(conflict_on_duplicate)?;
        info!(
            %user_id,
            trip_id = %saved.id,
            archive_code = %saved.lifecycle_marker,
            "trip created"
        );
        Ok(saved)
    }

    /// Overwrites the editable fields of a trip owned by `user_id`.
    pub async fn update_trip(
        &self,
        trip_id: TripId,
        details: TripDetails,
        user_id: UserId,
    ) -> Result<Trip, AppError> {
        let mut trip = self
            .store
            .find_trip_by_id(trip_id)
            .await?
            .ok_or(AppError::NotFound("trip"))?;
        if trip.user_id != user_id {
            warn!(%user_id, %trip_id, owner = %trip.user_id, "update of foreign trip refused");
            return Err(AppError::Forbidden);
        }
        let details = self.validate(details).await?;

        trip.apply(details, self.clock.now());
        let saved = self.store.save(&trip).await.map_err(conflict_on_duplicate)?;
        info!(%user_id, %trip_id, "trip updated");
        Ok(saved)
    }

    pub async fn get_current_trip(&self, user_id: UserId) -> Result<Option<Trip>, AppError> {
        Ok(self.store.find_active_trip_by_user(user_id).await?)
    }

    pub async fn get_past_trips(&self, user_id: UserId) -> Result<Vec<Trip>, AppError> {
        Ok(self.store.find_archived_trips_by_user(user_id).await?)
    }

    /// Attaches the destination country name.
    pub async fn describe(&self, trip: Trip) -> Result<TripView, AppError> {
        let country_name = self.country_name(trip.country_id).await?;
        Ok(TripView { trip, country_name })
    }

    pub async fn describe_all(&self, trips: Vec<Trip>) -> Result<Vec<TripView>, AppError> {
        let mut names: BTreeMap<CountryId, String> = BTreeMap::new();
        let mut views = Vec::with_capacity(trips.len());
        for trip in trips {
            let country_name = match names.get(&trip.country_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.country_name(trip.country_id).await?;
                    names.insert(trip.country_id, name.clone());
                    name
                }
            };
            views.push(TripView { trip, country_name });
        }
        Ok(views)
    }

    async fn country_name(&self, id: CountryId) -> Result<String, AppError> {
        self.store
            .find_country(id)
            .await?
            .map(|country| country.name)
            .ok_or(AppError::NotFound("country"))
    }

    /// Runs the sweep right now, outside the daily schedule.
    pub async fn force_sweep(&self) -> Result<SweepReport, AppError> {
        Ok(self.sweeper.sweep().await?)
    }

    async fn validate(&self, details: TripDetails) -> Result<TripDetails, AppError> {
        if !details.has_valid_dates() {
            return Err(AppError::Validation(format!(
                "end date {} is before start date {}",
                details.end_date, details.start_date
            )));
        }
        if self.store.find_country(details.country_id).await?.is_none() {
            return Err(AppError::NotFound("country"));
        }
        Ok(details.normalized())
    }
}

fn conflict_on_duplicate(err: StoreError) -> AppError {
    match err {
        StoreError::Duplicate(reason) => {
            warn!(%reason, "trip write rejected by uniqueness constraint");
            if reason.contains("archive_seq") {
                AppError::Conflict("archive code already issued".into())
            } else {
                AppError::Conflict(ACTIVE_TRIP_EXISTS.into())
            }
        }
        other => AppError::Store(other),
    }
}
