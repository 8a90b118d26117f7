//! Statistics from the crawl database
//!
//! Progress of every stage is derived from rows and flags alone, so these
//! numbers are meaningful while workers are still running.

use crate::config::CrawlerConfig;
use crate::crawler::WorkSelector;
use crate::state::ResourceClass;
use crate::storage::{Condition, Flag, Predicate, RunRecord, Storage, StorageResult, Table};

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Organic search results collected
    pub listing_rows: u64,

    /// Hotels eligible for the detail stage
    pub hotels_pending: u64,

    pub hotels_scraped: u64,

    /// Hotels eligible for the review stage
    pub reviews_pending: u64,

    pub reviews_scraped: u64,

    pub hotel_rows: u64,
    pub review_rows: u64,
    pub user_rows: u64,

    /// Most recent run of any stage
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `crawler` - Crawler settings; review-count bounds decide what is pending
pub fn load_statistics<S: Storage>(
    storage: &S,
    crawler: &CrawlerConfig,
) -> StorageResult<HarvestStatistics> {
    let selector = WorkSelector::from_config(crawler);
    let flagged = |flag| Predicate::all().and(Condition::FlagIs(flag, true));

    Ok(HarvestStatistics {
        listing_rows: storage.count_rows(Table::ListingResult, &Predicate::all())?,
        hotels_pending: selector.pending(storage, ResourceClass::Hotel)?,
        hotels_scraped: storage.count_rows(Table::ListingResult, &flagged(Flag::HotelScraped))?,
        reviews_pending: selector.pending(storage, ResourceClass::Review)?,
        reviews_scraped: storage
            .count_rows(Table::ListingResult, &flagged(Flag::ReviewsScraped))?,
        hotel_rows: storage.count_rows(Table::Hotel, &Predicate::all())?,
        review_rows: storage.count_rows(Table::Review, &Predicate::all())?,
        user_rows: storage.count_rows(Table::UserProfile, &Predicate::all())?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Listing:");
    println!("  Search results: {}", stats.listing_rows);
    println!();

    println!("Hotels:");
    println!("  Scraped: {}", stats.hotels_scraped);
    println!("  Pending: {}", stats.hotels_pending);
    println!("  Rows: {}", stats.hotel_rows);
    println!();

    println!("Reviews:");
    println!("  Hotels reconciled: {}", stats.reviews_scraped);
    println!("  Hotels pending: {}", stats.reviews_pending);
    println!("  Review rows: {}", stats.review_rows);
    println!("  User rows: {}", stats.user_rows);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Stage: {}", run.stage);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            println!(
                "  Finished: {}",
                run.finished_at.as_deref().unwrap_or("(still running)")
            );
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No runs recorded yet"),
    }

    let scraped_share = if stats.listing_rows > 0 {
        (stats.hotels_scraped as f64 / stats.listing_rows as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "\nDetail coverage: {:.1}% ({} / {} results)",
        scraped_share, stats.hotels_scraped, stats.listing_rows
    );
}
