//! Run orchestration
//!
//! The coordinator owns one worker run: it records the run, builds the
//! strategy for the requested resource class, drives the crawl machine until
//! the class is exhausted, and finalizes the run on every exit path,
//! including Ctrl-C. Hotel runs end with a sweep over hotels the geocoder
//! could not answer for.

use crate::config::Config;
use crate::crawler::fetcher::{HttpFetcher, PageSource};
use crate::crawler::hotel::{geocode_missing, GeocodeReport, HotelStrategy};
use crate::crawler::listing::ListingStrategy;
use crate::crawler::machine::{CrawlMachine, MachineReport, MachineSettings};
use crate::crawler::parser::SelectorExtractor;
use crate::crawler::review::ReviewStrategy;
use crate::crawler::selector::WorkSelector;
use crate::enrich::{Geocoder, LanguageDetector, NominatimGeocoder, UndeterminedLanguage};
use crate::state::ResourceClass;
use crate::storage::{open_storage, RunStatus, Storage};
use crate::Result;
use std::path::Path;

/// External capabilities a run depends on
pub struct Collaborators<P, G, L> {
    pub pages: P,
    pub geocoder: G,
    pub detector: L,
}

/// Outcome of one worker run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub class: ResourceClass,
    pub status: RunStatus,
    pub machine: MachineReport,

    /// Geocoding retries (hotel runs only)
    pub geocoding: Option<GeocodeReport>,
}

/// Drives a single resource class to exhaustion
pub struct Coordinator<S, P, G, L> {
    config: Config,
    storage: S,
    collaborators: Collaborators<P, G, L>,
    class: ResourceClass,
    run_id: i64,
}

impl<S, P, G, L> Coordinator<S, P, G, L>
where
    S: Storage,
    P: PageSource,
    G: Geocoder,
    L: LanguageDetector,
{
    /// Creates a coordinator and records a new run
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `class` - Resource class this worker processes
    /// * `storage` - An opened storage backend
    /// * `collaborators` - Page source, geocoder, and language detector
    pub fn new(
        config: Config,
        config_hash: &str,
        class: ResourceClass,
        mut storage: S,
        collaborators: Collaborators<P, G, L>,
    ) -> Result<Self> {
        let run_id = storage.create_run(class.to_db_string(), config_hash)?;
        tracing::info!("Started {} run {}", class, run_id);

        Ok(Self {
            config,
            storage,
            collaborators,
            class,
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs until the class is exhausted or the process is interrupted
    ///
    /// Uncommitted work is rolled back and the run row finalized whatever
    /// the exit path; committed pages and flags are never touched.
    pub async fn run(self) -> Result<RunReport> {
        let Self {
            config,
            mut storage,
            collaborators,
            class,
            run_id,
        } = self;
        let Collaborators {
            pages,
            geocoder,
            detector,
        } = collaborators;

        let settings = MachineSettings::from_config(&config.crawler);
        let selector = WorkSelector::from_config(&config.crawler);
        let extractor = SelectorExtractor;

        let outcome = {
            let work = async {
                let mut machine = CrawlMachine::new(&mut storage, &pages, &extractor, settings);
                let reports: Result<(MachineReport, Option<GeocodeReport>)> = match class {
                    ResourceClass::Listing => {
                        let mut strategy = ListingStrategy::new(
                            config.schema.listing.clone(),
                            config.site.clone(),
                            config.crawler.start_page,
                            config.crawler.listing_retry_budget,
                            config.crawler.max_pages,
                        );
                        Ok((machine.run(&mut strategy).await?, None))
                    }
                    ResourceClass::Hotel => {
                        let mut strategy = HotelStrategy::new(
                            config.schema.hotel.clone(),
                            selector,
                            geocoder,
                            config.geocoder.clone(),
                        );
                        let report = machine.run(&mut strategy).await?;
                        let geocoding = geocode_missing(
                            &mut storage,
                            strategy.geocoder(),
                            &config.geocoder,
                            settings.pacing,
                        )
                        .await?;
                        Ok((report, Some(geocoding)))
                    }
                    ResourceClass::Review => {
                        let mut strategy = ReviewStrategy::new(
                            config.schema.review.clone(),
                            selector,
                            detector,
                            config.crawler.reconciliation_tolerance,
                        );
                        Ok((machine.run(&mut strategy).await?, None))
                    }
                };
                reports
            };

            tokio::select! {
                result = work => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            }
        };

        let (status, result) = match outcome {
            Some(Ok(reports)) => (RunStatus::Completed, Ok(reports)),
            Some(Err(e)) => {
                tracing::error!("{} run {} failed: {}", class, run_id, e);
                (RunStatus::Failed, Err(e))
            }
            None => {
                tracing::warn!("Interrupted, discarding uncommitted work");
                (RunStatus::Interrupted, Ok((MachineReport::default(), None)))
            }
        };

        if let Err(e) = storage.rollback() {
            tracing::warn!("Rollback on exit failed: {}", e);
        }
        storage.finish_run(run_id, status)?;

        let (machine, geocoding) = result?;
        tracing::info!(
            "{} run {} {}: {} units ({} completed, {} incomplete, {} skipped), {} rows ({} new)",
            class,
            run_id,
            status.to_db_string(),
            machine.units_total(),
            machine.units_completed,
            machine.units_incomplete,
            machine.units_skipped,
            machine.rows_persisted,
            machine.rows_created
        );

        Ok(RunReport {
            run_id,
            class,
            status,
            machine,
            geocoding,
        })
    }
}

/// Runs one stage against the configured database and the live site
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file
/// * `class` - Resource class to process
/// * `test_mode` - Use the scratch database instead of the production one
pub async fn run_stage(
    config: Config,
    config_hash: &str,
    class: ResourceClass,
    test_mode: bool,
) -> Result<RunReport> {
    let path = Path::new(config.database_path(test_mode)).to_path_buf();
    tracing::info!("Opening database {}", path.display());
    let storage = open_storage(&path, config.lock_timeout())?;

    let collaborators = Collaborators {
        pages: HttpFetcher::from_config(&config.user_agent)?,
        geocoder: NominatimGeocoder::new(&config.geocoder, &config.user_agent)?,
        detector: UndeterminedLanguage,
    };

    Coordinator::new(config, config_hash, class, storage, collaborators)?
        .run()
        .await
}
