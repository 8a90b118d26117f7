//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Hotel-Harvest
//! database. Keys between tables are logical: stages run as independent
//! processes against the same file, so no foreign keys are enforced.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track worker runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Organic search results, root of the pipeline
CREATE TABLE IF NOT EXISTS listing_result (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    rating REAL,
    review_count INTEGER,
    page INTEGER,
    rank INTEGER,
    sponsored INTEGER NOT NULL DEFAULT 0,
    hotel_scraped INTEGER NOT NULL DEFAULT 0,
    reviews_scraped INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_listing_hotel_scraped ON listing_result(hotel_scraped);
CREATE INDEX IF NOT EXISTS idx_listing_reviews_scraped ON listing_result(reviews_scraped);

-- Hotel detail pages, keyed by listing_result.id
CREATE TABLE IF NOT EXISTS hotel (
    id INTEGER PRIMARY KEY,
    url TEXT,
    name TEXT,
    address TEXT,
    latitude REAL,
    longitude REAL,
    altitude REAL,
    geocoded INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    rating REAL,
    reviews INTEGER,
    category_rank INTEGER,
    star_rating REAL,
    nearby_restaurants INTEGER,
    nearby_attractions INTEGER,
    walkers_score INTEGER,
    pictures INTEGER,
    average_night_price REAL,
    price_range_min REAL,
    price_range_max REAL,
    property_amenities TEXT,
    room_features TEXT,
    room_types TEXT,
    location_rating REAL,
    cleanliness_rating REAL,
    service_rating REAL,
    value_rating REAL,
    also_known_as TEXT,
    formerly_known_as TEXT,
    city_location TEXT,
    number_of_rooms INTEGER,
    reviews_summary TEXT,
    reviews_keypoint_location TEXT,
    reviews_keypoint_atmosphere TEXT,
    reviews_keypoint_rooms TEXT,
    reviews_keypoint_value TEXT,
    reviews_keypoint_cleanliness TEXT,
    reviews_keypoint_service TEXT,
    reviews_keypoint_amenities TEXT,
    reviews_5_excellent INTEGER,
    reviews_4_very_good INTEGER,
    reviews_3_average INTEGER,
    reviews_2_poor INTEGER,
    reviews_1_terrible INTEGER,
    reviews_keywords TEXT
);

-- Reviews, keyed by hash of the permalink
CREATE TABLE IF NOT EXISTS review (
    id INTEGER PRIMARY KEY,
    url TEXT,
    title TEXT,
    text TEXT,
    rating REAL,
    month_of_review INTEGER,
    year_of_review INTEGER,
    month_of_stay INTEGER,
    year_of_stay INTEGER,
    likes INTEGER,
    pics_flag INTEGER,
    language TEXT,
    response_from TEXT,
    response_text TEXT,
    response_date TEXT,
    response_language TEXT,
    user_id INTEGER,
    hotel_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_hotel ON review(hotel_id);

-- Reviewers, keyed by hash of the profile URL
CREATE TABLE IF NOT EXISTS user_profile (
    id INTEGER PRIMARY KEY,
    url TEXT,
    name TEXT,
    name_shown TEXT,
    contributions INTEGER,
    helpful_votes INTEGER,
    location TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
