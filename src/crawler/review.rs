//! Review pages
//!
//! A hotel's reviews span many pages. Every page is committed on its own as
//! it is read; only after the last page does the unit compare the number of
//! persisted reviews against the total the site reports, and only a match
//! sets `reviews_scraped`.

use crate::config::PageSchema;
use crate::crawler::coerce::{
    classify_user_info, parse_review_date, parse_stay_date, profile_slug, FieldReader,
};
use crate::crawler::fetcher::LoadedPage;
use crate::crawler::machine::{Advance, CrawlStrategy, PageFailure, PageRows};
use crate::crawler::parser::{PageExtraction, RawRecord};
use crate::crawler::selector::WorkSelector;
use crate::enrich::LanguageDetector;
use crate::state::{ResourceClass, UnitOfWork, UnitOutcome};
use crate::storage::{Condition, Flag, Predicate, Record, Storage, Table};
use crate::url::{canonical_url, hash_id};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use url::Url;

/// Page-level field holding the site's review total
pub const REVIEW_TOTAL_FIELD: &str = "review_total";

/// Decides whether a hotel's reviews are completely persisted
///
/// The persisted count must lie within `tolerance` of the reported total on
/// either side. An unknown total never reconciles.
pub fn reconcile(reported: Option<i64>, persisted: u64, tolerance: u64) -> bool {
    let Some(reported) = reported else {
        return false;
    };
    let reported = reported.max(0) as u64;
    persisted + tolerance >= reported && persisted <= reported + tolerance
}

/// Strategy for a hotel's paginated reviews
pub struct ReviewStrategy<L> {
    schema: PageSchema,
    selector: WorkSelector,
    detector: L,
    tolerance: u64,
    today: NaiveDate,
}

impl<L: LanguageDetector> ReviewStrategy<L> {
    pub fn new(schema: PageSchema, selector: WorkSelector, detector: L, tolerance: u64) -> Self {
        Self {
            schema,
            selector,
            detector,
            tolerance,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Fixes the reference date used for relative review dates
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn selector(&self) -> &WorkSelector {
        &self.selector
    }

    /// Builds the user row and review row for one review box
    fn review_rows(
        &self,
        hotel_id: i64,
        page_url: &Url,
        item: &RawRecord,
    ) -> Result<(Record, Record)> {
        let reader = FieldReader::new(item);

        let review_url = canonical_url(&reader.require_text("url")?, page_url)?;
        let user_url = canonical_url(&reader.require_text("user_url")?, page_url)?;
        let user_id = hash_id(user_url.as_str());

        let info = classify_user_info(&reader.list("user_info"));
        let user = Record::new()
            .with("id", user_id)
            .with("url", user_url.as_str())
            .with("name", profile_slug(user_url.as_str()))
            .with("name_shown", reader.text("user_name"))
            .with("contributions", info.contributions)
            .with("helpful_votes", info.helpful_votes)
            .with("location", info.location);

        let text = reader.text("text");
        let language = text.as_deref().and_then(|t| self.detector.detect(t));
        let response_text = reader.text("response_text");
        let response_language = response_text
            .as_deref()
            .and_then(|t| self.detector.detect(t));

        let (month_of_review, year_of_review) = reader
            .text("review_date")
            .and_then(|d| parse_review_date(&d, self.today))
            .unzip();
        let (month_of_stay, year_of_stay) = reader
            .text("stay_date")
            .and_then(|d| parse_stay_date(&d, self.today))
            .unzip();

        let review = Record::new()
            .with("id", hash_id(review_url.as_str()))
            .with("url", review_url.as_str())
            .with("title", reader.text("title"))
            .with("text", text)
            .with("rating", reader.decimal("rating"))
            .with("month_of_review", month_of_review)
            .with("year_of_review", year_of_review)
            .with("month_of_stay", month_of_stay)
            .with("year_of_stay", year_of_stay)
            .with("likes", reader.count("likes"))
            .with("pics_flag", reader.flag("pics"))
            .with("language", language)
            .with("response_from", reader.text("response_from"))
            .with("response_text", response_text)
            .with("response_date", reader.text("response_date"))
            .with("response_language", response_language)
            .with("user_id", user_id)
            .with("hotel_id", hotel_id);

        Ok((user, review))
    }
}

#[async_trait]
impl<L: LanguageDetector> CrawlStrategy for ReviewStrategy<L> {
    fn class(&self) -> ResourceClass {
        ResourceClass::Review
    }

    fn schema(&self) -> &PageSchema {
        &self.schema
    }

    fn select<S: Storage>(&mut self, storage: &S) -> Result<Option<UnitOfWork>> {
        let Some(entity) = self.selector.next_eligible(storage, ResourceClass::Review)? else {
            return Ok(None);
        };

        let mut unit = UnitOfWork::for_entity(ResourceClass::Review, entity.id, entity.url);
        unit.reported_total = entity.review_count.filter(|count| *count > 0);
        Ok(Some(unit))
    }

    fn validate(
        &self,
        _unit: &UnitOfWork,
        extraction: &PageExtraction,
    ) -> std::result::Result<(), String> {
        if extraction.items.is_empty() {
            return Err("page shows no reviews".to_string());
        }
        Ok(())
    }

    fn on_page_failure(&self, unit: &UnitOfWork) -> PageFailure {
        // Past the first page, a page that will not load is the end of the reviews
        if unit.pages_loaded == 0 {
            PageFailure::Abandon
        } else {
            PageFailure::Conclude
        }
    }

    async fn build_rows(
        &mut self,
        unit: &mut UnitOfWork,
        page: &LoadedPage,
        extraction: PageExtraction,
    ) -> Result<PageRows> {
        let Some(hotel_id) = unit.entity_id else {
            return Err(HarvestError::Page {
                url: unit.url.clone(),
                message: "review unit without an entity id".to_string(),
            });
        };

        if let Some(total) = FieldReader::new(&extraction.fields).count(REVIEW_TOTAL_FIELD) {
            unit.reported_total = Some(total);
        }

        let page_url = Url::parse(&page.url)?;
        let mut rows = PageRows::default();

        for item in &extraction.items {
            match self.review_rows(hotel_id, &page_url, item) {
                Ok((user, review)) => {
                    rows.push(Table::UserProfile, user);
                    rows.push(Table::Review, review);
                }
                Err(e) => {
                    tracing::warn!("Dropping review of hotel {}: {}", hotel_id, e);
                    rows.failed += 1;
                }
            }
        }

        Ok(rows)
    }

    fn advance(&mut self, _unit: &UnitOfWork, next_page: Option<String>) -> Advance {
        match next_page {
            Some(url) => Advance::NextPage(url),
            None => Advance::Finish,
        }
    }

    fn finish<S: Storage>(&mut self, storage: &mut S, unit: &UnitOfWork) -> Result<UnitOutcome> {
        let Some(hotel_id) = unit.entity_id else {
            return Ok(UnitOutcome::incomplete("no entity id"));
        };

        let persisted = storage.count_rows(
            Table::Review,
            &Predicate::all().and(Condition::ColumnEquals(
                "hotel_id".to_string(),
                hotel_id.into(),
            )),
        )?;

        if !reconcile(unit.reported_total, persisted, self.tolerance) {
            return Ok(UnitOutcome::incomplete(format!(
                "{} reviews persisted, site reports {}",
                persisted,
                unit.reported_total
                    .map_or_else(|| "unknown".to_string(), |t| t.to_string())
            )));
        }

        let updated = storage.update_flag(
            Table::ListingResult,
            Flag::ReviewsScraped,
            true,
            &Predicate::id(hotel_id),
        )?;
        if updated == 0 {
            storage.rollback()?;
            return Ok(UnitOutcome::incomplete("listing row disappeared"));
        }
        storage.commit()?;

        tracing::info!(
            "Reviews of hotel {} reconciled: {} persisted, {:?} reported",
            hotel_id,
            persisted,
            unit.reported_total
        );
        Ok(UnitOutcome::Completed)
    }

    fn on_unit_end(&mut self, unit: &UnitOfWork, _outcome: &UnitOutcome) {
        if let Some(id) = unit.entity_id {
            self.selector.exclude(id);
        }
    }
}
