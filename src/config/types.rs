use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Main configuration structure for Hotel-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub site: SiteConfig,
    pub schema: SchemaConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
}

/// Crawl pacing, retry budgets, and eligibility bounds
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Attempts to load a page and find its marker before giving up
    #[serde(rename = "max-load-attempts", default = "default_max_load_attempts")]
    pub max_load_attempts: u32,

    /// Attempts to follow a review page's "next page" control
    #[serde(rename = "next-page-attempts", default = "default_next_page_attempts")]
    pub next_page_attempts: u32,

    /// Lower bound of the humanized delay (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the humanized delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive listing pages with no new rows tolerated before stopping
    #[serde(rename = "listing-retry-budget", default = "default_listing_retry_budget")]
    pub listing_retry_budget: u32,

    /// Allowed gap between reported and persisted review counts
    #[serde(
        rename = "reconciliation-tolerance",
        default = "default_reconciliation_tolerance"
    )]
    pub reconciliation_tolerance: u64,

    /// Hotels must report strictly more reviews than this to be eligible
    #[serde(rename = "min-hotel-reviews", default)]
    pub min_hotel_reviews: u64,

    /// Hotels reporting more reviews than this are not eligible
    #[serde(rename = "max-hotel-reviews", default)]
    pub max_hotel_reviews: Option<u64>,

    /// First listing page index
    #[serde(rename = "start-page", default)]
    pub start_page: u32,

    /// Hard stop on the number of listing pages visited in one run
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Hard stop on the pages followed within one unit (review pagination)
    #[serde(rename = "max-unit-pages", default)]
    pub max_unit_pages: Option<u32>,
}

fn default_max_load_attempts() -> u32 {
    5
}

fn default_next_page_attempts() -> u32 {
    3
}

fn default_min_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_listing_retry_budget() -> u32 {
    5
}

fn default_reconciliation_tolerance() -> u64 {
    10
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the production SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Scratch database used in test mode
    #[serde(rename = "test-database-path")]
    pub test_database_path: String,

    /// Directory for rolling log files in production mode
    #[serde(rename = "log-directory")]
    pub log_directory: String,

    /// How long a writer waits on a lock held by another worker
    #[serde(rename = "lock-timeout-secs", default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_lock_timeout_secs() -> u64 {
    60
}

/// Target site addressing
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Listing page URL with an `{offset}` placeholder
    #[serde(rename = "listing-url-template")]
    pub listing_url_template: String,

    /// Results per listing page; offset = page index * page size
    #[serde(rename = "listing-page-size", default = "default_listing_page_size")]
    pub listing_page_size: u32,
}

fn default_listing_page_size() -> u32 {
    30
}

impl SiteConfig {
    /// Builds the URL of listing page `page`
    pub fn listing_url(&self, page: u32) -> String {
        let offset = u64::from(page) * u64::from(self.listing_page_size);
        self.listing_url_template
            .replace("{offset}", &offset.to_string())
    }
}

/// Extraction schemas, one per resource class
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub listing: PageSchema,
    pub hotel: PageSchema,
    pub review: PageSchema,
}

/// How to pull fields out of one kind of page
#[derive(Debug, Clone, Deserialize)]
pub struct PageSchema {
    /// Element whose presence proves the page rendered
    pub marker: String,

    /// Repeated element holding one entity (listing rows, reviews)
    #[serde(default)]
    pub item: Option<String>,

    /// Fields read once per page
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSelector>,

    /// Fields read inside each item
    #[serde(rename = "item-fields", default)]
    pub item_fields: BTreeMap<String, FieldSelector>,

    /// Link to the next page of the same resource
    #[serde(rename = "next-page", default)]
    pub next_page: Option<String>,
}

/// Location of a single field
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelector {
    /// CSS selector
    pub selector: String,

    /// Read this attribute instead of the element's text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Only report whether the selector matches
    #[serde(default)]
    pub presence: bool,

    /// Collect every match instead of the first
    #[serde(default)]
    pub multiple: bool,
}

/// Geocoding service settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Search endpoint of a Nominatim-compatible service
    #[serde(default = "default_geocoder_endpoint")]
    pub endpoint: String,

    #[serde(rename = "timeout-secs", default = "default_geocoder_timeout_secs")]
    pub timeout_secs: u64,

    /// Hotel id → address to geocode instead of the scraped one
    #[serde(rename = "address-overrides", default)]
    pub address_overrides: HashMap<String, String>,
}

fn default_geocoder_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_geocoder_timeout_secs() -> u64 {
    10
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocoder_endpoint(),
            timeout_secs: default_geocoder_timeout_secs(),
            address_overrides: HashMap::new(),
        }
    }
}

impl GeocoderConfig {
    /// Returns the configured replacement address for a hotel, if any
    pub fn address_override(&self, hotel_id: i64) -> Option<&str> {
        self.address_overrides
            .get(&hotel_id.to_string())
            .map(String::as_str)
    }
}

impl Config {
    /// Database file for the selected mode
    pub fn database_path(&self, test_mode: bool) -> &str {
        if test_mode {
            &self.output.test_database_path
        } else {
            &self.output.database_path
        }
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.output.lock_timeout_secs)
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}
