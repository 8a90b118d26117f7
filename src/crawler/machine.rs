//! The crawl state machine
//!
//! One generic loop drives every resource class:
//!
//! ```text
//! SELECT ─▶ LOAD ─▶ VALIDATE ─▶ EXTRACT ─▶ PERSIST ─▶ ADVANCE ─┬─▶ LOAD (next page)
//!   │        │         │           │                           └─▶ DONE ─▶ SELECT
//!   │        └─────────┴───────────┴─▶ SKIPPED ─▶ SELECT
//!   └─▶ EXHAUSTED
//! ```
//!
//! Class-specific behavior lives behind [`CrawlStrategy`]. The machine owns
//! the ordering guarantees: rows of a page are committed as one batch, and a
//! strategy only gets to set a completion flag in [`CrawlStrategy::finish`],
//! after every page of the unit has been committed.

use crate::config::{CrawlerConfig, PageSchema};
use crate::crawler::fetcher::{LoadedPage, PageSource};
use crate::crawler::parser::{PageExtraction, PageExtractor};
use crate::crawler::retry::{with_retries, DelayRange, RetryOutcome, RetryPolicy};
use crate::state::{CrawlPhase, ResourceClass, UnitOfWork, UnitOutcome};
use crate::storage::{Record, Storage, Table};
use crate::{HarvestError, Result};
use async_trait::async_trait;

/// What an exhausted load or rejected page means for the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFailure {
    /// Give up on the unit; nothing is flagged and it is retried next run
    Abandon,

    /// The resource has no more pages; finish the unit normally
    Conclude,
}

/// Where to go after a page has been persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    NextPage(String),
    Finish,
}

/// Rows produced from one page, in upsert order
#[derive(Debug, Clone, Default)]
pub struct PageRows {
    pub rows: Vec<(Table, Record)>,

    /// Items dropped during extraction
    pub failed: usize,
}

impl PageRows {
    pub fn push(&mut self, table: Table, record: Record) {
        self.rows.push((table, record));
    }
}

/// Class-specific callbacks plugged into the [`CrawlMachine`]
#[async_trait]
pub trait CrawlStrategy: Send {
    fn class(&self) -> ResourceClass;

    /// Extraction schema for this class's pages
    fn schema(&self) -> &PageSchema;

    /// Picks the next unit, or `None` when the class is exhausted
    fn select<S: Storage>(&mut self, storage: &S) -> Result<Option<UnitOfWork>>;

    /// Class-specific sanity check on a freshly extracted page
    fn validate(
        &self,
        _unit: &UnitOfWork,
        _extraction: &PageExtraction,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Decides what a failed load or rejected page means
    fn on_page_failure(&self, unit: &UnitOfWork) -> PageFailure;

    /// Turns raw values into typed rows
    ///
    /// Errors skip the whole unit. Item-level problems should be counted in
    /// [`PageRows::failed`] instead.
    async fn build_rows(
        &mut self,
        unit: &mut UnitOfWork,
        page: &LoadedPage,
        extraction: PageExtraction,
    ) -> Result<PageRows>;

    /// Chooses the next page after a successful persist
    fn advance(&mut self, unit: &UnitOfWork, next_page: Option<String>) -> Advance;

    /// Completes a unit whose pages are all committed; flags are set here
    fn finish<S: Storage>(&mut self, storage: &mut S, unit: &UnitOfWork) -> Result<UnitOutcome>;

    /// Called once per unit, whatever the outcome
    fn on_unit_end(&mut self, _unit: &UnitOfWork, _outcome: &UnitOutcome) {}
}

/// Retry budgets and pacing for the machine
#[derive(Debug, Clone, Copy)]
pub struct MachineSettings {
    /// Initial load of a unit
    pub load: RetryPolicy,

    /// Following a unit's "next page" control
    pub next_page: RetryPolicy,

    /// Humanized pause between pages and units
    pub pacing: DelayRange,

    /// Pages a single unit may load before pagination is cut off
    pub max_unit_pages: Option<u32>,
}

impl MachineSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let delay = DelayRange::new(config.min_delay_ms, config.max_delay_ms);
        Self {
            load: RetryPolicy::new(config.max_load_attempts, delay),
            next_page: RetryPolicy::new(config.next_page_attempts, delay),
            pacing: delay,
            max_unit_pages: config.max_unit_pages,
        }
    }
}

/// Totals for one machine run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineReport {
    pub units_completed: usize,
    pub units_incomplete: usize,
    pub units_skipped: usize,
    pub unit_errors: usize,
    pub pages_loaded: usize,
    pub rows_persisted: usize,
    pub rows_created: usize,
    pub rows_failed: usize,
}

impl MachineReport {
    pub fn units_total(&self) -> usize {
        self.units_completed + self.units_incomplete + self.units_skipped
    }

    fn record(&mut self, unit: &UnitOfWork, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Completed => self.units_completed += 1,
            UnitOutcome::Incomplete { .. } => self.units_incomplete += 1,
            UnitOutcome::Skipped { .. } => self.units_skipped += 1,
        }
        self.pages_loaded += unit.pages_loaded as usize;
        self.rows_persisted += unit.rows_persisted;
        self.rows_created += unit.rows_created;
        self.rows_failed += unit.rows_failed;
    }
}

/// Sequential driver of the crawl state machine
pub struct CrawlMachine<'a, S, P, E> {
    storage: &'a mut S,
    pages: &'a P,
    extractor: &'a E,
    settings: MachineSettings,
}

impl<'a, S, P, E> CrawlMachine<'a, S, P, E>
where
    S: Storage,
    P: PageSource,
    E: PageExtractor,
{
    pub fn new(
        storage: &'a mut S,
        pages: &'a P,
        extractor: &'a E,
        settings: MachineSettings,
    ) -> Self {
        Self {
            storage,
            pages,
            extractor,
            settings,
        }
    }

    /// Processes units until the strategy reports exhaustion
    ///
    /// Unit-level failures are contained: uncommitted work is rolled back,
    /// the unit counts as skipped, and the loop moves on. Only a failure to
    /// select work or to roll back ends the run with an error.
    pub async fn run<C: CrawlStrategy>(&mut self, strategy: &mut C) -> Result<MachineReport> {
        let mut report = MachineReport::default();

        loop {
            let Some(mut unit) = strategy.select(&*self.storage)? else {
                tracing::info!(
                    "No eligible {} work left ({} units processed)",
                    strategy.class(),
                    report.units_total()
                );
                break;
            };

            tracing::info!("Processing {} ({})", unit.label(), unit.url);

            let outcome = match self.process_unit(strategy, &mut unit).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        unit = %unit.label(),
                        phase = %unit.phase(),
                        "Unit failed: {}",
                        e
                    );
                    self.storage.rollback()?;
                    report.unit_errors += 1;
                    UnitOutcome::skipped(e.to_string())
                }
            };

            match &outcome {
                UnitOutcome::Completed => tracing::info!(
                    "Completed {}: {} rows ({} new) over {} pages",
                    unit.label(),
                    unit.rows_persisted,
                    unit.rows_created,
                    unit.pages_loaded
                ),
                UnitOutcome::Incomplete { reason } => {
                    tracing::warn!("Left {} unflagged: {}", unit.label(), reason)
                }
                UnitOutcome::Skipped { reason } => {
                    tracing::warn!("Skipped {}: {}", unit.label(), reason)
                }
            }

            report.record(&unit, &outcome);
            strategy.on_unit_end(&unit, &outcome);
            self.settings.pacing.pause().await;
        }

        Ok(report)
    }

    async fn process_unit<C: CrawlStrategy>(
        &mut self,
        strategy: &mut C,
        unit: &mut UnitOfWork,
    ) -> Result<UnitOutcome> {
        let mut policy = self.settings.load;
        unit.transition(CrawlPhase::Load)?;

        loop {
            // LOAD
            let page = match self.load_page(strategy.schema(), &unit.url, &policy).await {
                Some(page) => page,
                None => match strategy.on_page_failure(unit) {
                    PageFailure::Abandon => {
                        unit.transition(CrawlPhase::Skipped)?;
                        return Ok(UnitOutcome::skipped(format!(
                            "could not load {}",
                            unit.url
                        )));
                    }
                    PageFailure::Conclude => {
                        unit.transition(CrawlPhase::Done)?;
                        break;
                    }
                },
            };
            unit.pages_loaded += 1;
            unit.mark_visited();

            // VALIDATE
            unit.transition(CrawlPhase::Validate)?;
            let extraction = match self.extractor.extract(&page, strategy.schema()) {
                Ok(extraction) => extraction,
                Err(e) => {
                    unit.transition(CrawlPhase::Skipped)?;
                    return Ok(UnitOutcome::skipped(format!("extraction failed: {}", e)));
                }
            };
            if let Err(reason) = strategy.validate(unit, &extraction) {
                tracing::debug!("Rejected {}: {}", unit.url, reason);
                match strategy.on_page_failure(unit) {
                    PageFailure::Abandon => {
                        unit.transition(CrawlPhase::Skipped)?;
                        return Ok(UnitOutcome::skipped(reason));
                    }
                    PageFailure::Conclude => {
                        unit.transition(CrawlPhase::Done)?;
                        break;
                    }
                }
            }

            // EXTRACT
            unit.transition(CrawlPhase::Extract)?;
            let next_page = extraction.next_page.clone();
            let rows = match strategy.build_rows(unit, &page, extraction).await {
                Ok(rows) => rows,
                Err(e) => {
                    unit.transition(CrawlPhase::Skipped)?;
                    return Ok(UnitOutcome::skipped(format!("extraction failed: {}", e)));
                }
            };

            // PERSIST
            unit.transition(CrawlPhase::Persist)?;
            self.persist(unit, rows)?;

            // ADVANCE
            unit.transition(CrawlPhase::Advance)?;
            let at_limit =
                matches!(self.settings.max_unit_pages, Some(max) if unit.pages_loaded >= max);
            match strategy.advance(unit, next_page) {
                Advance::NextPage(url) if unit.has_visited(&url) => {
                    tracing::warn!(
                        "{}: next page {} was already loaded, ending pagination",
                        unit.label(),
                        url
                    );
                    unit.transition(CrawlPhase::Done)?;
                    break;
                }
                Advance::NextPage(_) if at_limit => {
                    tracing::warn!(
                        "{}: loaded {} pages, the per-unit limit, ending pagination",
                        unit.label(),
                        unit.pages_loaded
                    );
                    unit.transition(CrawlPhase::Done)?;
                    break;
                }
                Advance::NextPage(url) => {
                    tracing::debug!("{}: next page {}", unit.label(), url);
                    unit.url = url;
                    policy = self.settings.next_page;
                    unit.transition(CrawlPhase::Load)?;
                    self.settings.pacing.pause().await;
                }
                Advance::Finish => {
                    unit.transition(CrawlPhase::Done)?;
                    break;
                }
            }
        }

        strategy.finish(self.storage, unit)
    }

    /// Loads a page and checks its marker, retrying both together
    async fn load_page(
        &self,
        schema: &PageSchema,
        url: &str,
        policy: &RetryPolicy,
    ) -> Option<LoadedPage> {
        let pages = self.pages;
        let extractor = self.extractor;
        let label = format!("load {}", url);

        let outcome = with_retries(policy, &label, |_| async move {
            let page = pages.load(url).await?;
            if !extractor.has_marker(&page, schema)? {
                return Err(HarvestError::Page {
                    url: url.to_string(),
                    message: format!("marker '{}' not found", schema.marker),
                });
            }
            Ok::<_, HarvestError>(page)
        })
        .await;

        match outcome {
            RetryOutcome::Success(page) => Some(page),
            RetryOutcome::Exhausted { .. } => None,
        }
    }

    /// Upserts a page's rows and commits them as one batch
    fn persist(&mut self, unit: &mut UnitOfWork, rows: PageRows) -> Result<()> {
        unit.rows_failed += rows.failed;

        for (table, record) in &rows.rows {
            match self.storage.upsert_row(*table, record) {
                Ok(outcome) => {
                    unit.rows_persisted += 1;
                    if outcome.created {
                        unit.rows_created += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        unit = %unit.label(),
                        table = %table,
                        id = ?record.id(),
                        "Row abandoned: {}",
                        e
                    );
                    unit.rows_failed += 1;
                }
            }
        }

        self.storage.commit()?;
        tracing::debug!(
            "{}: committed {} rows from {}",
            unit.label(),
            rows.rows.len(),
            unit.url
        );
        Ok(())
    }
}
