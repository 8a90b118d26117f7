//! Crawler module: the crawl state machine and its collaborators
//!
//! This module contains the core crawling logic, including:
//! - Page loading over HTTP with bounded, humanized retries
//! - Schema-driven extraction and coercion of raw field values
//! - Flag-driven work selection
//! - One strategy per resource class plugged into a shared state machine
//! - Run orchestration

mod coerce;
mod coordinator;
mod fetcher;
mod hotel;
mod listing;
mod machine;
mod parser;
mod retry;
mod review;
mod selector;

pub use coerce::{
    classify_user_info, parse_count, parse_decimal, parse_price_range, parse_review_date,
    parse_stay_date, profile_slug, FieldReader, UserInfo, LIST_DELIMITER,
};
pub use coordinator::{run_stage, Collaborators, Coordinator, RunReport};
pub use fetcher::{build_http_client, HttpFetcher, LoadedPage, PageSource};
pub use hotel::{geocode_missing, GeocodeReport, HotelStrategy};
pub use listing::{ListingCursor, ListingStrategy};
pub use machine::{
    Advance, CrawlMachine, CrawlStrategy, MachineReport, MachineSettings, PageFailure, PageRows,
};
pub use parser::{
    ExtractError, PageExtraction, PageExtractor, RawRecord, RawValue, SelectorExtractor,
};
pub use retry::{with_retries, DelayRange, RetryOutcome, RetryPolicy};
pub use review::{reconcile, ReviewStrategy, REVIEW_TOTAL_FIELD};
pub use selector::{EntityRef, WorkSelector};
