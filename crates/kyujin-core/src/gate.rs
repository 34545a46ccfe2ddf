//! The single write path into listing storage.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::ClassifiedListing;
use crate::traits::ListingStore;

/// What happened to one listing at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted(Uuid),
    SkippedDuplicate,
}

/// Commits listings at most once per (title, company) key unless forced.
///
/// The key is compared exactly: no case folding, no whitespace normalization.
#[derive(Debug, Clone)]
pub struct PersistenceGate<S: ListingStore> {
    store: S,
}

impl<S: ListingStore> PersistenceGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Insert unless a listing with the same key is already stored.
    pub async fn try_persist(&self, listing: &ClassifiedListing) -> Result<PersistOutcome, AppError> {
        if self.store.exists(listing.title(), listing.company()).await? {
            tracing::debug!(
                title = %listing.title(),
                company = %listing.company(),
                "Duplicate listing skipped"
            );
            return Ok(PersistOutcome::SkippedDuplicate);
        }
        self.force_persist(listing).await
    }

    /// Insert without the duplicate check.
    pub async fn force_persist(
        &self,
        listing: &ClassifiedListing,
    ) -> Result<PersistOutcome, AppError> {
        let id = self.store.insert(listing).await?;
        Ok(PersistOutcome::Inserted(id))
    }

    pub async fn persist(
        &self,
        listing: &ClassifiedListing,
        force: bool,
    ) -> Result<PersistOutcome, AppError> {
        if force {
            self.force_persist(listing).await
        } else {
            self.try_persist(listing).await
        }
    }
}
