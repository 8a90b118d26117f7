//! Output module for run reports and database statistics
//!
//! This module handles:
//! - Loading progress statistics from the store
//! - Printing statistics and end-of-run summaries

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::crawler::RunReport;

/// Prints the end-of-run summary to stdout
///
/// # Arguments
///
/// * `report` - The report returned by the coordinator
pub fn print_run_report(report: &RunReport) {
    let machine = &report.machine;

    println!("=== {} run {} ===\n", report.class, report.run_id);
    println!("Status: {}", report.status.to_db_string());
    println!(
        "Units: {} ({} completed, {} incomplete, {} skipped, {} errors)",
        machine.units_total(),
        machine.units_completed,
        machine.units_incomplete,
        machine.units_skipped,
        machine.unit_errors
    );
    println!("Pages loaded: {}", machine.pages_loaded);
    println!(
        "Rows: {} persisted, {} new, {} failed",
        machine.rows_persisted, machine.rows_created, machine.rows_failed
    );
    if let Some(geocoding) = &report.geocoding {
        println!(
            "Geocoding retries: {} hotels ({} resolved, {} unresolved, {} failed)",
            geocoding.attempted, geocoding.resolved, geocoding.unresolved, geocoding.failed
        );
    }
}
