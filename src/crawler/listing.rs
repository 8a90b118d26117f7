//! Search-result pages
//!
//! Listing pages carry no completion flag. The crawl walks page indexes
//! upward and stops at the first page without a "next page" control, when
//! the schema names one. Independently, it stops once pages stop producing
//! previously unseen rows. A page with nothing new is re-read rather than
//! trusted, since a partially rendered page looks exactly like the end of
//! the results.

use crate::config::{PageSchema, SiteConfig};
use crate::crawler::coerce::FieldReader;
use crate::crawler::fetcher::LoadedPage;
use crate::crawler::machine::{Advance, CrawlStrategy, PageFailure, PageRows};
use crate::crawler::parser::PageExtraction;
use crate::state::{ResourceClass, UnitOfWork, UnitOutcome};
use crate::storage::{Record, Storage, Table};
use crate::url::{canonical_url, hash_id};
use crate::Result;
use async_trait::async_trait;
use url::Url;

/// Page index plus the "no new rows" debounce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCursor {
    page: u32,
    no_new_streak: u32,
    retry_budget: u32,
    exhausted: bool,
}

impl ListingCursor {
    pub fn new(start_page: u32, retry_budget: u32) -> Self {
        Self {
            page: start_page,
            no_new_streak: 0,
            retry_budget,
            exhausted: false,
        }
    }

    /// Current page index
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Consecutive retries spent on pages without new rows
    pub fn streak(&self) -> u32 {
        self.no_new_streak
    }

    /// Moves the cursor after a page produced `new_rows` unseen rows
    ///
    /// New rows reset the streak and move to the next page. Otherwise the
    /// same page is retried until the budget is spent, which ends the crawl.
    pub fn record(&mut self, new_rows: usize) {
        if self.exhausted {
            return;
        }

        if new_rows > 0 {
            self.no_new_streak = 0;
            self.page += 1;
        } else if self.no_new_streak < self.retry_budget {
            self.no_new_streak += 1;
            tracing::info!(
                "Page {} produced no new results, retrying ({}/{})",
                self.page,
                self.no_new_streak,
                self.retry_budget
            );
        } else {
            tracing::info!(
                "Page {} produced no new results after {} retries, listing exhausted",
                self.page,
                self.retry_budget
            );
            self.exhausted = true;
        }
    }

    /// Ends the crawl after the current page
    pub fn conclude(&mut self) {
        self.exhausted = true;
    }
}

/// Strategy for search-result pages
pub struct ListingStrategy {
    schema: PageSchema,
    site: SiteConfig,
    cursor: ListingCursor,
    max_pages: Option<u32>,
    units_started: u32,
    last_page: bool,
}

impl ListingStrategy {
    pub fn new(
        schema: PageSchema,
        site: SiteConfig,
        start_page: u32,
        retry_budget: u32,
        max_pages: Option<u32>,
    ) -> Self {
        Self {
            schema,
            site,
            cursor: ListingCursor::new(start_page, retry_budget),
            max_pages,
            units_started: 0,
            last_page: false,
        }
    }

    pub fn cursor(&self) -> &ListingCursor {
        &self.cursor
    }

    fn result_row(&self, page_url: &Url, page: u32, reader: FieldReader<'_>) -> Result<Record> {
        let href = reader.require_text("url")?;
        let url = canonical_url(&href, page_url)?;

        let review_count = reader.count("reviews");
        // No reviews means no meaningful rating
        let rating = match review_count {
            Some(0) => None,
            _ => reader.decimal("rating"),
        };

        Ok(Record::new()
            .with("id", hash_id(url.as_str()))
            .with("url", url.as_str())
            .with("rating", rating)
            .with("review_count", review_count)
            .with("page", page)
            .with("rank", reader.count("rank"))
            .with("sponsored", false))
    }
}

#[async_trait]
impl CrawlStrategy for ListingStrategy {
    fn class(&self) -> ResourceClass {
        ResourceClass::Listing
    }

    fn schema(&self) -> &PageSchema {
        &self.schema
    }

    fn select<S: Storage>(&mut self, _storage: &S) -> Result<Option<UnitOfWork>> {
        if self.cursor.is_exhausted() {
            return Ok(None);
        }
        if let Some(max) = self.max_pages {
            if self.units_started >= max {
                tracing::info!("Reached max_pages ({}), stopping listing crawl", max);
                return Ok(None);
            }
        }

        self.units_started += 1;
        let page = self.cursor.page();
        Ok(Some(UnitOfWork::for_listing_page(
            page,
            self.site.listing_url(page),
        )))
    }

    fn validate(
        &self,
        _unit: &UnitOfWork,
        extraction: &PageExtraction,
    ) -> std::result::Result<(), String> {
        if extraction.items.is_empty() {
            return Err("page lists no results".to_string());
        }
        Ok(())
    }

    fn on_page_failure(&self, _unit: &UnitOfWork) -> PageFailure {
        // Counts as a page with no new rows
        PageFailure::Conclude
    }

    async fn build_rows(
        &mut self,
        unit: &mut UnitOfWork,
        page: &LoadedPage,
        extraction: PageExtraction,
    ) -> Result<PageRows> {
        let page_url = Url::parse(&page.url)?;
        let page_index = unit.listing_page.unwrap_or_else(|| self.cursor.page());
        let mut rows = PageRows::default();

        for item in &extraction.items {
            let reader = FieldReader::new(item);
            if reader.flag("sponsored") {
                tracing::debug!("Skipping sponsored result {:?}", reader.text("url"));
                continue;
            }

            match self.result_row(&page_url, page_index, reader) {
                Ok(record) => rows.push(Table::ListingResult, record),
                Err(e) => {
                    tracing::warn!("Dropping result on page {}: {}", page_index, e);
                    rows.failed += 1;
                }
            }
        }

        Ok(rows)
    }

    fn advance(&mut self, _unit: &UnitOfWork, next_page: Option<String>) -> Advance {
        // Pages are addressed by offset; the control only tells whether more exist
        self.last_page = self.schema.next_page.is_some() && next_page.is_none();
        Advance::Finish
    }

    fn finish<S: Storage>(&mut self, _storage: &mut S, _unit: &UnitOfWork) -> Result<UnitOutcome> {
        Ok(UnitOutcome::Completed)
    }

    fn on_unit_end(&mut self, unit: &UnitOfWork, outcome: &UnitOutcome) {
        let new_rows = if outcome.is_completed() {
            unit.rows_created
        } else {
            0
        };
        tracing::info!(
            "Listing page {}: {} rows, {} new",
            unit.listing_page.unwrap_or_default(),
            unit.rows_persisted,
            new_rows
        );
        self.cursor.record(new_rows);

        if std::mem::take(&mut self.last_page) && outcome.is_completed() {
            tracing::info!(
                "Listing page {} has no next-page control, listing exhausted",
                unit.listing_page.unwrap_or_default()
            );
            self.cursor.conclude();
        }
    }
}
