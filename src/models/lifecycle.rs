//! Trip lifecycle states and the single automatic transition between them.
//!
//! A trip starts out [`LifecycleMarker::Active`] (rendered `"NOW"`) and is
//! moved to [`LifecycleMarker::Archived`] once its end date has passed.
//! Archived is terminal: there is no way back and an archived trip is never
//! renumbered.

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::NaiveDate;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

pub const ACTIVE_CODE: &str = "NOW";
pub const ARCHIVE_PREFIX: char = 'B';

/// Per-user archive sequence number, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveSeq(NonZeroU32);

impl ArchiveSeq {
    pub const FIRST: ArchiveSeq = ArchiveSeq(NonZeroU32::MIN);

    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The sequence number that follows `max`, where `max == 0` means the
    /// user has nothing archived yet.
    pub fn after(max: u32) -> Option<Self> {
        max.checked_add(1).and_then(Self::new)
    }
}

impl fmt::Display for ArchiveSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ARCHIVE_PREFIX}{:02}", self.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SerializeDisplay, DeserializeFromStr)]
pub enum LifecycleMarker {
    #[default]
    Active,
    Archived(ArchiveSeq),
}

impl LifecycleMarker {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleMarker::Active)
    }

    pub fn archive_seq(&self) -> Option<ArchiveSeq> {
        match self {
            LifecycleMarker::Active => None,
            LifecycleMarker::Archived(seq) => Some(*seq),
        }
    }

    /// A trip is eligible for archiving once `today` is strictly after its
    /// end date. A trip ending today stays active until tomorrow.
    pub fn is_eligible(&self, end_date: NaiveDate, today: NaiveDate) -> bool {
        self.is_active() && end_date < today
    }

    /// `ACTIVE -> ARCHIVED(next)`. Every other combination is rejected.
    pub fn archive(
        &self,
        end_date: NaiveDate,
        today: NaiveDate,
        next: ArchiveSeq,
    ) -> Result<LifecycleMarker, TransitionError> {
        match self {
            LifecycleMarker::Archived(seq) => Err(TransitionError::AlreadyArchived(*seq)),
            LifecycleMarker::Active if end_date >= today => {
                Err(TransitionError::NotYetEnded { end_date, today })
            }
            LifecycleMarker::Active => Ok(LifecycleMarker::Archived(next)),
        }
    }
}

impl fmt::Display for LifecycleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleMarker::Active => f.write_str(ACTIVE_CODE),
            LifecycleMarker::Archived(seq) => write!(f, "{seq}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerParseError {
    #[error("lifecycle marker must be \"NOW\" or \"B\" followed by at least two digits, got {0:?}")]
    Malformed(String),
    #[error("archive sequence must start at 1, got {0:?}")]
    Zero(String),
}

impl FromStr for LifecycleMarker {
    type Err = MarkerParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.eq_ignore_ascii_case(ACTIVE_CODE) {
            return Ok(LifecycleMarker::Active);
        }
        let digits = value
            .strip_prefix(ARCHIVE_PREFIX)
            .filter(|digits| digits.len() >= 2 && digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| MarkerParseError::Malformed(raw.to_string()))?;
        let number: u32 = digits
            .parse()
            .map_err(|_| MarkerParseError::Malformed(raw.to_string()))?;
        ArchiveSeq::new(number)
            .map(LifecycleMarker::Archived)
            .ok_or_else(|| MarkerParseError::Zero(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("trip is already archived as {0}")]
    AlreadyArchived(ArchiveSeq),
    #[error("trip ends on {end_date} and is not archivable on {today}")]
    NotYetEnded { end_date: NaiveDate, today: NaiveDate },
}
