//! Integration tests for the harvest stages
//!
//! These tests use wiremock to serve a small fake travel site and run each
//! stage end-to-end against an on-disk database.

use async_trait::async_trait;
use hotel_harvest::config::{parse_config, Config};
use hotel_harvest::crawler::{Collaborators, Coordinator, HttpFetcher, RunReport};
use hotel_harvest::enrich::{GeoPoint, Geocoder, UndeterminedLanguage};
use hotel_harvest::storage::{
    Condition, FieldValue, Flag, Predicate, Record, RunRecord, RunStatus, SqliteStorage, Storage,
    StorageError, StorageResult, Table, UpsertOutcome,
};
use hotel_harvest::{canonical_url, hash_id, HarvestError, ResourceClass};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG_TEMPLATE: &str = r#"
[crawler]
max-load-attempts = 1
next-page-attempts = 1
min-delay-ms = 0
max-delay-ms = 0
listing-retry-budget = 2
reconciliation-tolerance = @TOLERANCE@

[user-agent]
crawler-name = "HarvestTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "test@example.com"

[output]
database-path = "@DIR@/harvest.db"
test-database-path = "@DIR@/harvest_test.db"
log-directory = "@DIR@/logs"
lock-timeout-secs = 5

[site]
listing-url-template = "@URI@/Hotels-oa{offset}.html"
listing-page-size = 30

[schema.listing]
marker = "div.results"
item = "div.listItem"

[schema.listing.item-fields]
url = { selector = "a.title", attribute = "href" }
reviews = { selector = "span.reviews" }
rating = { selector = "span.rating" }
rank = { selector = "span.rank" }
sponsored = { selector = ".sponsored", presence = true }

[schema.hotel]
marker = "h1#HEADING"

[schema.hotel.fields]
name = { selector = "h1#HEADING" }
address = { selector = "span.address" }
rating = { selector = "span.score" }
property_amenities = { selector = "li.amenity", multiple = true }

[schema.review]
marker = "div.reviews"
item = "div.review"
next-page = "a.next"

[schema.review.fields]
review_total = { selector = "span.total" }

[schema.review.item-fields]
url = { selector = "a.permalink", attribute = "href" }
title = { selector = "h3" }
text = { selector = "q" }
rating = { selector = "span.bubbles" }
review_date = { selector = "span.written" }
user_url = { selector = "a.user", attribute = "href" }
user_name = { selector = "a.user" }
user_info = { selector = "span.info", multiple = true }
"#;

/// Geocoder that places every hotel in central Rome
struct RomeGeocoder;

#[async_trait]
impl Geocoder for RomeGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>, HarvestError> {
        Ok(Some(GeoPoint {
            latitude: 41.9,
            longitude: 12.5,
            altitude: None,
        }))
    }
}

/// Storage that fails every flag update, simulating a crash between the
/// data commit and the flag write
struct FlagCrashStorage {
    inner: SqliteStorage,
}

impl Storage for FlagCrashStorage {
    fn create_run(&mut self, stage: &str, config_hash: &str) -> StorageResult<i64> {
        self.inner.create_run(stage, config_hash)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.inner.finish_run(run_id, status)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn select_random_row(
        &self,
        table: Table,
        columns: &[&str],
        predicate: &Predicate,
    ) -> StorageResult<Option<Record>> {
        self.inner.select_random_row(table, columns, predicate)
    }

    fn row_exists(&self, table: Table, id: i64) -> StorageResult<bool> {
        self.inner.row_exists(table, id)
    }

    fn upsert_row(&mut self, table: Table, record: &Record) -> StorageResult<UpsertOutcome> {
        self.inner.upsert_row(table, record)
    }

    fn update_columns(&mut self, table: Table, id: i64, record: &Record) -> StorageResult<usize> {
        self.inner.update_columns(table, id, record)
    }

    fn update_flag(
        &mut self,
        _table: Table,
        _flag: Flag,
        _value: bool,
        _predicate: &Predicate,
    ) -> StorageResult<usize> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected crash before flag write",
        )))
    }

    fn count_rows(&self, table: Table, predicate: &Predicate) -> StorageResult<u64> {
        self.inner.count_rows(table, predicate)
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.inner.rollback()
    }
}

fn create_test_config(uri: &str, dir: &Path, tolerance: u64) -> Config {
    let content = CONFIG_TEMPLATE
        .replace("@URI@", uri)
        .replace("@DIR@", &dir.display().to_string())
        .replace("@TOLERANCE@", &tolerance.to_string());
    parse_config(&content).expect("test config should be valid")
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("harvest.db")
}

fn open(dir: &Path) -> SqliteStorage {
    SqliteStorage::new(&db_path(dir), Duration::from_secs(5)).expect("open database")
}

async fn serve(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

async fn serve_once(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// One search result: (hotel path, review count, sponsored)
fn listing_html(results: &[(&str, u32, bool)]) -> String {
    let mut body = String::from("<html><body><div class=\"results\">");
    for (rank, (href, reviews, sponsored)) in results.iter().enumerate() {
        body.push_str(&format!(
            "<div class=\"listItem\"><a class=\"title\" href=\"{}?from=list\">Hotel</a>\
             <span class=\"reviews\">{} reviews</span>\
             <span class=\"rating\">4.5 of 5 bubbles</span>\
             <span class=\"rank\">{}.</span>{}</div>",
            href,
            reviews,
            rank + 1,
            if *sponsored {
                "<span class=\"sponsored\">Sponsored</span>"
            } else {
                ""
            }
        ));
    }
    body.push_str("</div></body></html>");
    body
}

fn with_next_link(html: String, href: &str) -> String {
    html.replace(
        "</body>",
        &format!("<a class=\"next\" href=\"{}\">Next</a></body>", href),
    )
}

fn hotel_html(name: &str, address: &str) -> String {
    format!(
        "<html><body><h1 id=\"HEADING\">{}</h1><span class=\"address\">{}</span>\
         <span class=\"score\">4.5</span>\
         <ul><li class=\"amenity\">Pool</li><li class=\"amenity\">Bar</li></ul></body></html>",
        name, address
    )
}

/// One review: (permalink path, user profile path)
fn reviews_html(total: &str, reviews: &[(&str, &str)], next: Option<&str>) -> String {
    let mut body = format!(
        "<html><body><span class=\"total\">{}</span><div class=\"reviews\">",
        total
    );
    for (permalink, user) in reviews {
        body.push_str(&format!(
            "<div class=\"review\"><a class=\"user\" href=\"{}\">Someone</a>\
             <span class=\"info\">Rome, Italy</span><span class=\"info\">7 contributions</span>\
             <a class=\"permalink\" href=\"{}\"><h3>Nice stay</h3></a>\
             <span class=\"bubbles\">5.0 of 5 bubbles</span>\
             <span class=\"written\">Mar 2023</span><q>Great location.</q></div>",
            user, permalink
        ));
    }
    body.push_str("</div>");
    if let Some(next) = next {
        body.push_str(&format!("<a class=\"next\" href=\"{}\">Next</a>", next));
    }
    body.push_str("</body></html>");
    body
}

fn seed_listing(storage: &mut SqliteStorage, url: &str, reviews: i64, hotel_scraped: bool) -> i64 {
    let id = hash_id(url);
    storage
        .upsert_row(
            Table::ListingResult,
            &Record::new()
                .with("id", id)
                .with("url", url)
                .with("review_count", reviews)
                .with("hotel_scraped", hotel_scraped),
        )
        .expect("seed listing row");
    storage.commit().expect("commit seed");
    id
}

fn is_flagged<S: Storage>(storage: &S, id: i64, flag: Flag) -> bool {
    storage
        .count_rows(
            Table::ListingResult,
            &Predicate::id(id).and(Condition::FlagIs(flag, true)),
        )
        .expect("count flagged")
        == 1
}

fn reviews_of<S: Storage>(storage: &S, hotel_id: i64) -> u64 {
    storage
        .count_rows(
            Table::Review,
            &Predicate::all().and(Condition::ColumnEquals(
                "hotel_id".to_string(),
                hotel_id.into(),
            )),
        )
        .expect("count reviews")
}

async fn run_stage_with<S: Storage>(
    config: Config,
    class: ResourceClass,
    storage: S,
) -> RunReport {
    let collaborators = Collaborators {
        pages: HttpFetcher::from_config(&config.user_agent).expect("http client"),
        geocoder: RomeGeocoder,
        detector: UndeterminedLanguage,
    };
    Coordinator::new(config, "test-hash", class, storage, collaborators)
        .expect("create coordinator")
        .run()
        .await
        .expect("run stage")
}

#[tokio::test]
async fn test_listing_stage_debounces_and_skips_sponsored() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 10);

    serve(
        &server,
        "/Hotels-oa0.html",
        listing_html(&[
            ("/Hotel_Review-d1.html", 50, false),
            ("/Hotel_Review-d9.html", 30, true),
            ("/Hotel_Review-d2.html", 1204, false),
        ]),
    )
    .await;
    // Page 1 first renders stale results, then the real ones
    serve_once(
        &server,
        "/Hotels-oa30.html",
        listing_html(&[("/Hotel_Review-d1.html", 50, false)]),
    )
    .await;
    serve(
        &server,
        "/Hotels-oa30.html",
        listing_html(&[("/Hotel_Review-d3.html", 0, false)]),
    )
    .await;

    let report = run_stage_with(config, ResourceClass::Listing, open(dir.path())).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.machine.pages_loaded, 3);
    // Two pages with results, one stale retry, and the empty page 2 three
    // times (the first visit plus the whole retry budget)
    assert_eq!(report.machine.units_total(), 6);
    assert_eq!(report.machine.rows_created, 3);

    let storage = open(dir.path());
    let base = server.uri();
    let id = |route: &str| hash_id(&format!("{}{}", base, route));

    assert_eq!(
        storage
            .count_rows(Table::ListingResult, &Predicate::all())
            .unwrap(),
        3
    );
    assert!(!storage
        .row_exists(Table::ListingResult, id("/Hotel_Review-d9.html"))
        .unwrap());

    let d2 = storage
        .select_random_row(
            Table::ListingResult,
            &["url", "review_count", "page", "rank"],
            &Predicate::id(id("/Hotel_Review-d2.html")),
        )
        .unwrap()
        .expect("d2 persisted");
    assert_eq!(d2.get_str("url"), Some(format!("{}/Hotel_Review-d2.html", base).as_str()));
    assert_eq!(d2.get_i64("review_count"), Some(1204));
    assert_eq!(d2.get_i64("page"), Some(0));
    assert_eq!(d2.get_i64("rank"), Some(3));

    let d3 = storage
        .select_random_row(
            Table::ListingResult,
            &["rating", "page"],
            &Predicate::id(id("/Hotel_Review-d3.html")),
        )
        .unwrap()
        .expect("d3 persisted");
    assert_eq!(d3.get_f64("rating"), Some(-1.0));
    assert_eq!(d3.get_i64("page"), Some(1));

    let run = storage.get_latest_run().unwrap().expect("run recorded");
    assert_eq!(run.stage, "listing");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_listing_stops_after_retry_budget_without_new_rows() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 10);

    let page = listing_html(&[("/Hotel_Review-d1.html", 5, false)]);
    serve(&server, "/Hotels-oa0.html", page.clone()).await;
    serve(&server, "/Hotels-oa30.html", page).await;

    let report = run_stage_with(config, ResourceClass::Listing, open(dir.path())).await;

    // Page 0 once, then page 1 for the first visit and both retries
    assert_eq!(report.machine.pages_loaded, 4);
    assert_eq!(report.machine.rows_created, 1);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/Hotels-oa60.html"));
}

#[tokio::test]
async fn test_listing_stops_at_page_without_next_control() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path(), 10);
    config.schema.listing.next_page = Some("a.next".to_string());

    serve(
        &server,
        "/Hotels-oa0.html",
        with_next_link(
            listing_html(&[("/Hotel_Review-d1.html", 12, false)]),
            "/Hotels-oa30.html",
        ),
    )
    .await;
    serve(
        &server,
        "/Hotels-oa30.html",
        listing_html(&[("/Hotel_Review-d2.html", 8, false)]),
    )
    .await;
    serve(
        &server,
        "/Hotels-oa60.html",
        listing_html(&[("/Hotel_Review-d3.html", 4, false)]),
    )
    .await;

    let report = run_stage_with(config, ResourceClass::Listing, open(dir.path())).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.machine.pages_loaded, 2);
    assert_eq!(report.machine.units_total(), 2);
    assert_eq!(report.machine.rows_created, 2);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/Hotels-oa60.html"));
}

#[tokio::test]
async fn test_hotel_stage_persists_row_then_sets_flag() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 10);
    let base = server.uri();

    let (h1, h2, h3) = {
        let mut storage = open(dir.path());
        (
            seed_listing(&mut storage, &format!("{}/Hotel_Review-d1.html", base), 50, false),
            seed_listing(&mut storage, &format!("{}/Hotel_Review-d2.html", base), 120, false),
            seed_listing(&mut storage, &format!("{}/Hotel_Review-d3.html", base), 0, false),
        )
    };

    serve(&server, "/Hotel_Review-d1.html", hotel_html("Foo", "Bar St")).await;
    serve(&server, "/Hotel_Review-d3.html", hotel_html("Unreviewed", "Side St")).await;

    let report = run_stage_with(config, ResourceClass::Hotel, open(dir.path())).await;

    assert_eq!(report.machine.units_completed, 1);
    assert_eq!(report.machine.units_skipped, 1);
    // Every hotel row was geocoded on the first attempt
    assert_eq!(report.geocoding.map(|g| g.attempted), Some(0));

    let storage = open(dir.path());
    let hotel = storage
        .select_random_row(
            Table::Hotel,
            &["name", "address", "latitude", "longitude", "property_amenities", "rating"],
            &Predicate::id(h1),
        )
        .unwrap()
        .expect("hotel row written");
    assert_eq!(hotel.get_str("name"), Some("Foo"));
    assert_eq!(hotel.get_str("address"), Some("Bar St"));
    assert_eq!(hotel.get_f64("latitude"), Some(41.9));
    assert_eq!(hotel.get_f64("longitude"), Some(12.5));
    assert_eq!(hotel.get_str("property_amenities"), Some("Pool,Bar"));
    assert_eq!(hotel.get_f64("rating"), Some(4.5));
    assert!(is_flagged(&storage, h1, Flag::HotelScraped));

    // Unloadable hotel stays eligible for a future run
    assert!(!storage.row_exists(Table::Hotel, h2).unwrap());
    assert!(!is_flagged(&storage, h2, Flag::HotelScraped));

    // No reviews, never eligible
    assert!(!storage.row_exists(Table::Hotel, h3).unwrap());
    assert!(!is_flagged(&storage, h3, Flag::HotelScraped));
}

#[tokio::test]
async fn test_review_stage_reconciles_before_flagging() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 0);
    let base = server.uri();

    let hotel = {
        let mut storage = open(dir.path());
        seed_listing(
            &mut storage,
            &format!("{}/Hotel_Review-d1-Reviews.html", base),
            50,
            true,
        )
    };

    serve(
        &server,
        "/Hotel_Review-d1-Reviews.html",
        reviews_html(
            "3 reviews",
            &[
                ("/ShowUserReviews-r1.html", "/Profile/anna"),
                ("/ShowUserReviews-r2.html", "/Profile/ben"),
            ],
            Some("/Hotel_Review-d1-Reviews-or10.html"),
        ),
    )
    .await;
    serve(
        &server,
        "/Hotel_Review-d1-Reviews-or10.html",
        reviews_html("3 reviews", &[("/ShowUserReviews-r3.html", "/Profile/anna")], None),
    )
    .await;

    let report = run_stage_with(config, ResourceClass::Review, open(dir.path())).await;

    assert_eq!(report.machine.units_completed, 1);
    assert_eq!(report.machine.pages_loaded, 2);

    let storage = open(dir.path());
    assert_eq!(reviews_of(&storage, hotel), 3);
    assert_eq!(
        storage
            .count_rows(Table::UserProfile, &Predicate::all())
            .unwrap(),
        2
    );
    assert!(is_flagged(&storage, hotel, Flag::ReviewsScraped));

    let review = storage
        .select_random_row(
            Table::Review,
            &["user_id", "month_of_review", "year_of_review", "language"],
            &Predicate::id(hash_id(&format!("{}/ShowUserReviews-r3.html", base))),
        )
        .unwrap()
        .expect("review row written");
    assert_eq!(
        review.get_i64("user_id"),
        Some(hash_id(&format!("{}/Profile/anna", base)))
    );
    assert_eq!(review.get_i64("month_of_review"), Some(3));
    assert_eq!(review.get_i64("year_of_review"), Some(2023));
    assert_eq!(review.get_str("language"), Some("NA"));
}

#[tokio::test]
async fn test_review_pagination_stops_when_next_link_loops_back() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 0);
    let base = server.uri();

    let hotel = {
        let mut storage = open(dir.path());
        seed_listing(
            &mut storage,
            &format!("{}/Hotel_Review-d5-Reviews.html", base),
            2,
            true,
        )
    };

    serve(
        &server,
        "/Hotel_Review-d5-Reviews.html",
        reviews_html(
            "2 reviews",
            &[("/ShowUserReviews-r51.html", "/Profile/dora")],
            Some("/Hotel_Review-d5-Reviews-or10.html"),
        ),
    )
    .await;
    serve(
        &server,
        "/Hotel_Review-d5-Reviews-or10.html",
        reviews_html(
            "2 reviews",
            &[("/ShowUserReviews-r52.html", "/Profile/emil")],
            Some("/Hotel_Review-d5-Reviews.html#REVIEWS"),
        ),
    )
    .await;

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        run_stage_with(config, ResourceClass::Review, open(dir.path())),
    )
    .await
    .expect("review pagination should terminate");

    assert_eq!(report.machine.units_completed, 1);
    assert_eq!(report.machine.pages_loaded, 2);

    let storage = open(dir.path());
    assert_eq!(reviews_of(&storage, hotel), 2);
    assert!(is_flagged(&storage, hotel, Flag::ReviewsScraped));
}

#[tokio::test]
async fn test_review_stage_leaves_short_hotel_unflagged() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), 10);
    let base = server.uri();

    let hotel = {
        let mut storage = open(dir.path());
        seed_listing(
            &mut storage,
            &format!("{}/Hotel_Review-d4-Reviews.html", base),
            40,
            true,
        )
    };

    serve(
        &server,
        "/Hotel_Review-d4-Reviews.html",
        reviews_html("40 reviews", &[("/ShowUserReviews-r9.html", "/Profile/cleo")], None),
    )
    .await;

    let report = run_stage_with(config, ResourceClass::Review, open(dir.path())).await;

    assert_eq!(report.machine.units_incomplete, 1);
    assert_eq!(report.status, RunStatus::Completed);

    let storage = open(dir.path());
    assert_eq!(reviews_of(&storage, hotel), 1);
    assert!(!is_flagged(&storage, hotel, Flag::ReviewsScraped));
}

#[tokio::test]
async fn test_crash_before_hotel_flag_is_retried_without_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    let hotel = {
        let mut storage = open(dir.path());
        seed_listing(&mut storage, &format!("{}/Hotel_Review-d1.html", base), 50, false)
    };
    serve(&server, "/Hotel_Review-d1.html", hotel_html("Foo", "Bar St")).await;

    let crashing = FlagCrashStorage {
        inner: open(dir.path()),
    };
    let report = run_stage_with(
        create_test_config(&base, dir.path(), 10),
        ResourceClass::Hotel,
        crashing,
    )
    .await;
    assert_eq!(report.machine.unit_errors, 1);

    {
        let storage = open(dir.path());
        assert!(storage.row_exists(Table::Hotel, hotel).unwrap());
        assert!(!is_flagged(&storage, hotel, Flag::HotelScraped));
    }

    // Restart: the hotel is selected again and its row replaced in place
    let report = run_stage_with(
        create_test_config(&base, dir.path(), 10),
        ResourceClass::Hotel,
        open(dir.path()),
    )
    .await;
    assert_eq!(report.machine.units_completed, 1);
    assert_eq!(report.machine.rows_created, 0);

    let storage = open(dir.path());
    assert!(is_flagged(&storage, hotel, Flag::HotelScraped));
    assert_eq!(storage.count_rows(Table::Hotel, &Predicate::all()).unwrap(), 1);
}

#[tokio::test]
async fn test_crash_before_review_flag_is_retried_without_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    let hotel = {
        let mut storage = open(dir.path());
        seed_listing(
            &mut storage,
            &format!("{}/Hotel_Review-d5-Reviews.html", base),
            2,
            true,
        )
    };
    serve(
        &server,
        "/Hotel_Review-d5-Reviews.html",
        reviews_html(
            "2 reviews",
            &[
                ("/ShowUserReviews-r5.html", "/Profile/dora"),
                ("/ShowUserReviews-r6.html", "/Profile/eli"),
            ],
            None,
        ),
    )
    .await;

    let crashing = FlagCrashStorage {
        inner: open(dir.path()),
    };
    run_stage_with(
        create_test_config(&base, dir.path(), 0),
        ResourceClass::Review,
        crashing,
    )
    .await;

    {
        let storage = open(dir.path());
        assert_eq!(reviews_of(&storage, hotel), 2);
        assert!(!is_flagged(&storage, hotel, Flag::ReviewsScraped));
    }

    run_stage_with(
        create_test_config(&base, dir.path(), 0),
        ResourceClass::Review,
        open(dir.path()),
    )
    .await;

    let storage = open(dir.path());
    assert_eq!(reviews_of(&storage, hotel), 2);
    assert_eq!(
        storage
            .count_rows(Table::UserProfile, &Predicate::all())
            .unwrap(),
        2
    );
    assert!(is_flagged(&storage, hotel, Flag::ReviewsScraped));
}

#[tokio::test]
async fn test_sponsored_results_never_reach_hotel_stage() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    serve(
        &server,
        "/Hotels-oa0.html",
        listing_html(&[
            ("/Hotel_Review-d7.html", 12, true),
            ("/Hotel_Review-d8.html", 12, false),
        ]),
    )
    .await;
    serve(&server, "/Hotel_Review-d7.html", hotel_html("Ad", "Ad St")).await;
    serve(&server, "/Hotel_Review-d8.html", hotel_html("Organic", "Main St")).await;

    run_stage_with(
        create_test_config(&base, dir.path(), 10),
        ResourceClass::Listing,
        open(dir.path()),
    )
    .await;
    let report = run_stage_with(
        create_test_config(&base, dir.path(), 10),
        ResourceClass::Hotel,
        open(dir.path()),
    )
    .await;

    assert_eq!(report.machine.units_total(), 1);
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| r.url.path() != "/Hotel_Review-d7.html"));
}

#[test]
fn test_null_coercion_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut storage = open(dir.path());
        storage
            .upsert_row(
                Table::Review,
                &Record::new()
                    .with("id", 11i64)
                    .with("hotel_id", 1i64)
                    .with("likes", None::<i64>)
                    .with("title", None::<String>)
                    .with("pics_flag", true),
            )
            .unwrap();
        storage.commit().unwrap();
    }

    let storage = open(dir.path());
    let row = storage
        .select_random_row(
            Table::Review,
            &["likes", "title", "pics_flag", "rating"],
            &Predicate::id(11),
        )
        .unwrap()
        .unwrap();
    assert_eq!(row.get("likes"), Some(&FieldValue::Integer(-1)));
    assert_eq!(row.get("title"), Some(&FieldValue::Text("NA".to_string())));
    assert_eq!(row.get("pics_flag"), Some(&FieldValue::Integer(1)));
    assert_eq!(row.get_f64("rating"), Some(-1.0));
}

#[test]
fn test_identity_is_stable_across_url_variants() {
    let base = url::Url::parse("https://www.example.com/Hotels-oa30.html").unwrap();
    let plain = canonical_url("/Hotel_Review-d1.html", &base).unwrap();
    let tracked = canonical_url("/Hotel_Review-d1.html?from=list#reviews", &base).unwrap();

    assert_eq!(plain, tracked);
    assert_eq!(hash_id(plain.as_str()), hash_id(tracked.as_str()));
    assert_eq!(
        hash_id(plain.as_str()),
        hash_id("https://www.example.com/Hotel_Review-d1.html")
    );
    assert!((0..1_000_000_000_000_000_000).contains(&hash_id(plain.as_str())));
}
