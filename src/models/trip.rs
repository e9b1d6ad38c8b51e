use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::LifecycleMarker;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TripId(pub Uuid);

impl TripId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CountryId(pub i64);

impl fmt::Display for CountryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub user_id: UserId,
    pub country_id: CountryId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trip_name: Option<String>,
    pub purpose: Option<String>,
    pub lifecycle_marker: LifecycleMarker,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(user_id: UserId, details: TripDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: TripId::new(),
            user_id,
            country_id: details.country_id,
            start_date: details.start_date,
            end_date: details.end_date,
            trip_name: details.trip_name,
            purpose: details.purpose,
            lifecycle_marker: LifecycleMarker::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the user-editable fields. The lifecycle marker is left alone.
    pub fn apply(&mut self, details: TripDetails, now: DateTime<Utc>) {
        self.country_id = details.country_id;
        self.start_date = details.start_date;
        self.end_date = details.end_date;
        self.trip_name = details.trip_name;
        self.purpose = details.purpose;
        self.updated_at = now;
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle_marker.is_active()
    }

    pub fn archive_code(&self) -> String {
        self.lifecycle_marker.to_string()
    }
}

/// A trip as returned to its owner, with the destination name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub country_name: String,
}

/// The mutable, caller-supplied part of a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub country_id: CountryId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub trip_name: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl TripDetails {
    pub fn new(country_id: CountryId, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            country_id,
            start_date,
            end_date,
            trip_name: None,
            purpose: None,
        }
    }

    pub fn named(mut self, trip_name: impl Into<String>) -> Self {
        self.trip_name = Some(trip_name.into());
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Trims free text and drops empty values.
    pub fn normalized(mut self) -> Self {
        self.trip_name = normalize_optional(self.trip_name);
        self.purpose = normalize_optional(self.purpose);
        self
    }

    pub fn has_valid_dates(&self) -> bool {
        self.end_date >= self.start_date
    }
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
