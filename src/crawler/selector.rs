//! Work selection from persisted flags
//!
//! The selector holds no progress of its own: eligibility is a predicate over
//! `listing_result` flags, and the choice among eligible rows is random. The
//! only in-memory state is the per-run exclusion set, which keeps a run from
//! re-selecting a unit it already gave up on.

use crate::config::CrawlerConfig;
use crate::state::ResourceClass;
use crate::storage::{Condition, Flag, Predicate, Storage, StorageResult, Table};
use std::collections::BTreeSet;

/// A selected `ListingResult` row
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub id: i64,
    pub url: String,
    pub review_count: Option<i64>,
}

/// Picks the next eligible entity for a resource class
#[derive(Debug, Clone, Default)]
pub struct WorkSelector {
    min_reviews: u64,
    max_reviews: Option<u64>,
    excluded: BTreeSet<i64>,
}

impl WorkSelector {
    /// Creates a selector with review-count bounds
    ///
    /// # Arguments
    ///
    /// * `min_reviews` - Strict lower bound on `review_count`
    /// * `max_reviews` - Optional inclusive upper bound on `review_count`
    pub fn new(min_reviews: u64, max_reviews: Option<u64>) -> Self {
        Self {
            min_reviews,
            max_reviews,
            excluded: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.min_hotel_reviews, config.max_hotel_reviews)
    }

    /// Eligibility predicate for `class`, ignoring the exclusion set
    ///
    /// Listing pages have no persisted completion bit, so there is no
    /// predicate for them.
    pub fn eligibility(&self, class: ResourceClass) -> Option<Predicate> {
        let (hotel_scraped, reviews_scraped) = match class {
            ResourceClass::Listing => return None,
            ResourceClass::Hotel => (false, None),
            ResourceClass::Review => (true, Some(false)),
        };

        let mut predicate = Predicate::all()
            .and(Condition::ColumnGreaterThan(
                "review_count".to_string(),
                (self.min_reviews as i64).into(),
            ))
            .and(Condition::FlagIs(Flag::HotelScraped, hotel_scraped));

        if let Some(value) = reviews_scraped {
            predicate = predicate.and(Condition::FlagIs(Flag::ReviewsScraped, value));
        }

        if let Some(max) = self.max_reviews {
            predicate = predicate.and(Condition::ColumnAtMost(
                "review_count".to_string(),
                (max as i64).into(),
            ));
        }

        Some(predicate)
    }

    /// Returns a random eligible entity, or `None` when the class is exhausted
    pub fn next_eligible<S: Storage>(
        &self,
        storage: &S,
        class: ResourceClass,
    ) -> StorageResult<Option<EntityRef>> {
        let Some(predicate) = self.eligibility(class) else {
            return Ok(None);
        };
        let predicate =
            predicate.and(Condition::IdNotIn(self.excluded.iter().copied().collect()));

        let row = storage.select_random_row(
            Table::ListingResult,
            &["id", "url", "review_count"],
            &predicate,
        )?;

        Ok(row.and_then(|record| {
            Some(EntityRef {
                id: record.id()?,
                url: record.get_str("url")?.to_string(),
                review_count: record.get_i64("review_count"),
            })
        }))
    }

    /// Counts eligible rows still waiting in the store
    pub fn pending<S: Storage>(&self, storage: &S, class: ResourceClass) -> StorageResult<u64> {
        match self.eligibility(class) {
            Some(predicate) => storage.count_rows(Table::ListingResult, &predicate),
            None => Ok(0),
        }
    }

    /// Keeps `id` out of selection for the rest of this run
    pub fn exclude(&mut self, id: i64) {
        self.excluded.insert(id);
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Record, SqliteStorage};

    fn seed(storage: &mut SqliteStorage, id: i64, reviews: i64) {
        storage
            .upsert_row(
                Table::ListingResult,
                &Record::new()
                    .with("id", id)
                    .with("url", format!("https://example.com/h{}", id))
                    .with("review_count", reviews),
            )
            .unwrap();
    }

    fn flag(storage: &mut SqliteStorage, id: i64, flag: Flag) {
        storage
            .update_flag(Table::ListingResult, flag, true, &Predicate::id(id))
            .unwrap();
    }

    #[test]
    fn test_hotel_eligibility_requires_reviews() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed(&mut storage, 1, 0);
        seed(&mut storage, 2, 50);
        storage.commit().unwrap();

        let selector = WorkSelector::new(0, None);
        let entity = selector
            .next_eligible(&storage, ResourceClass::Hotel)
            .unwrap()
            .unwrap();
        assert_eq!(entity.id, 2);
        assert_eq!(entity.review_count, Some(50));
    }

    #[test]
    fn test_review_eligibility_follows_hotel_flag() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed(&mut storage, 1, 10);
        seed(&mut storage, 2, 10);
        seed(&mut storage, 3, 10);
        flag(&mut storage, 2, Flag::HotelScraped);
        flag(&mut storage, 3, Flag::HotelScraped);
        flag(&mut storage, 3, Flag::ReviewsScraped);
        storage.commit().unwrap();

        let selector = WorkSelector::new(0, None);
        let entity = selector
            .next_eligible(&storage, ResourceClass::Review)
            .unwrap()
            .unwrap();
        assert_eq!(entity.id, 2);

        assert_eq!(selector.pending(&storage, ResourceClass::Hotel).unwrap(), 1);
        assert_eq!(selector.pending(&storage, ResourceClass::Review).unwrap(), 1);
    }

    #[test]
    fn test_exclusion_leads_to_exhaustion() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed(&mut storage, 1, 10);
        storage.commit().unwrap();

        let mut selector = WorkSelector::new(0, None);
        assert!(selector
            .next_eligible(&storage, ResourceClass::Hotel)
            .unwrap()
            .is_some());

        selector.exclude(1);
        assert!(selector
            .next_eligible(&storage, ResourceClass::Hotel)
            .unwrap()
            .is_none());
        assert_eq!(selector.excluded_count(), 1);
    }

    #[test]
    fn test_review_bounds() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed(&mut storage, 1, 5);
        seed(&mut storage, 2, 500);
        seed(&mut storage, 3, 50);
        storage.commit().unwrap();

        let selector = WorkSelector::new(10, Some(100));
        for _ in 0..5 {
            let entity = selector
                .next_eligible(&storage, ResourceClass::Hotel)
                .unwrap()
                .unwrap();
            assert_eq!(entity.id, 3);
        }
    }

    #[test]
    fn test_listing_has_no_predicate() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let selector = WorkSelector::default();
        assert!(selector.eligibility(ResourceClass::Listing).is_none());
        assert!(selector
            .next_eligible(&storage, ResourceClass::Listing)
            .unwrap()
            .is_none());
    }
}
