use std::sync::Arc;

use crate::{
    models::{lifecycle::ArchiveSeq, trip::UserId},
    services::store::{StoreError, TripStore},
};

/// A proposed archive sequence for one user.
///
/// Only valid while the user's highest sequence is still `expected_max`;
/// [`TripStore::archive_if_active`] enforces that when it is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub expected_max: u32,
    pub next: ArchiveSeq,
}

impl Allocation {
    pub fn after(expected_max: u32) -> Result<Self, StoreError> {
        let next =
            ArchiveSeq::after(expected_max).ok_or(StoreError::SequenceExhausted(expected_max))?;
        Ok(Self { expected_max, next })
    }
}

#[derive(Clone)]
pub struct CodeSequencer {
    store: Arc<dyn TripStore>,
}

impl CodeSequencer {
    pub fn new(store: Arc<dyn TripStore>) -> Self {
        Self { store }
    }

    /// Next archive sequence for `user_id`: current maximum plus one.
    pub async fn next(&self, user_id: UserId) -> Result<Allocation, StoreError> {
        let max = self.store.max_archived_sequence(user_id).await?;
        Allocation::after(max)
    }
}
