//! Hotel detail pages
//!
//! One page per hotel. Schema fields are mapped onto `hotel` columns by
//! name; the address is geocoded before the row is written, and the
//! `hotel_scraped` flag is only set once the row has been committed.
//!
//! A geocoder outage must not hold a hotel back, so the row is written
//! without coordinates and `hotel.geocoded` stays unset. [`geocode_missing`]
//! retries those hotels at the end of every hotel run.

use crate::config::{GeocoderConfig, PageSchema};
use crate::crawler::coerce::{parse_price_range, FieldReader};
use crate::crawler::fetcher::LoadedPage;
use crate::crawler::machine::{Advance, CrawlStrategy, PageFailure, PageRows};
use crate::crawler::parser::PageExtraction;
use crate::crawler::retry::DelayRange;
use crate::crawler::selector::WorkSelector;
use crate::enrich::{GeoPoint, Geocoder};
use crate::state::{ResourceClass, UnitOfWork, UnitOutcome};
use crate::storage::{
    ColumnKind, Condition, FieldValue, Flag, Predicate, Record, Storage, Table, TEXT_SENTINEL,
};
use crate::Result;
use async_trait::async_trait;

/// Hotel columns filled straight from a same-named schema field
const SCRAPED_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", ColumnKind::Text),
    ("address", ColumnKind::Text),
    ("description", ColumnKind::Text),
    ("rating", ColumnKind::Real),
    ("reviews", ColumnKind::Integer),
    ("category_rank", ColumnKind::Integer),
    ("star_rating", ColumnKind::Real),
    ("nearby_restaurants", ColumnKind::Integer),
    ("nearby_attractions", ColumnKind::Integer),
    ("walkers_score", ColumnKind::Integer),
    ("pictures", ColumnKind::Integer),
    ("average_night_price", ColumnKind::Real),
    ("property_amenities", ColumnKind::Text),
    ("room_features", ColumnKind::Text),
    ("room_types", ColumnKind::Text),
    ("location_rating", ColumnKind::Real),
    ("cleanliness_rating", ColumnKind::Real),
    ("service_rating", ColumnKind::Real),
    ("value_rating", ColumnKind::Real),
    ("also_known_as", ColumnKind::Text),
    ("formerly_known_as", ColumnKind::Text),
    ("city_location", ColumnKind::Text),
    ("number_of_rooms", ColumnKind::Integer),
    ("reviews_summary", ColumnKind::Text),
    ("reviews_keypoint_location", ColumnKind::Text),
    ("reviews_keypoint_atmosphere", ColumnKind::Text),
    ("reviews_keypoint_rooms", ColumnKind::Text),
    ("reviews_keypoint_value", ColumnKind::Text),
    ("reviews_keypoint_cleanliness", ColumnKind::Text),
    ("reviews_keypoint_service", ColumnKind::Text),
    ("reviews_keypoint_amenities", ColumnKind::Text),
    ("reviews_5_excellent", ColumnKind::Integer),
    ("reviews_4_very_good", ColumnKind::Integer),
    ("reviews_3_average", ColumnKind::Integer),
    ("reviews_2_poor", ColumnKind::Integer),
    ("reviews_1_terrible", ColumnKind::Integer),
    ("reviews_keywords", ColumnKind::Text),
];

/// Schema field split into `price_range_min` / `price_range_max`
const PRICE_RANGE_FIELD: &str = "price_range";

/// Reads a schema field typed for its column
fn typed_value(reader: &FieldReader<'_>, field: &str, kind: ColumnKind) -> FieldValue {
    match kind {
        ColumnKind::Integer => reader.count(field).into(),
        ColumnKind::Real => reader.decimal(field).into(),
        ColumnKind::Text => reader.text(field).into(),
    }
}

/// Strategy for hotel detail pages
pub struct HotelStrategy<G> {
    schema: PageSchema,
    selector: WorkSelector,
    geocoder: G,
    geocoder_config: GeocoderConfig,
    /// Hotel of the current unit, once the geocoder has answered for it
    geocoded: Option<i64>,
}

impl<G: Geocoder> HotelStrategy<G> {
    pub fn new(
        schema: PageSchema,
        selector: WorkSelector,
        geocoder: G,
        geocoder_config: GeocoderConfig,
    ) -> Self {
        Self {
            schema,
            selector,
            geocoder,
            geocoder_config,
            geocoded: None,
        }
    }

    pub fn selector(&self) -> &WorkSelector {
        &self.selector
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }
}

/// Geocodes a hotel, preferring a configured override address
///
/// `Ok(None)` means the geocoder answered that the address does not resolve;
/// `Err` means it could not answer at all.
async fn locate<G: Geocoder>(
    geocoder: &G,
    config: &GeocoderConfig,
    hotel_id: i64,
    scraped: &str,
) -> Result<Option<GeoPoint>> {
    let address = match config.address_override(hotel_id) {
        Some(replacement) => {
            tracing::debug!("Using override address for hotel {}", hotel_id);
            replacement
        }
        None => scraped,
    };

    let point = geocoder.geocode(address).await?;
    match point {
        Some(point) => tracing::debug!(
            "Geocoded hotel {}: {}, {}",
            hotel_id,
            point.latitude,
            point.longitude
        ),
        None => tracing::info!("Address of hotel {} did not resolve: {}", hotel_id, address),
    }
    Ok(point)
}

fn coordinates(point: Option<GeoPoint>) -> Record {
    Record::new()
        .with("latitude", point.map(|p| p.latitude))
        .with("longitude", point.map(|p| p.longitude))
        .with("altitude", point.and_then(|p| p.altitude))
}

/// Totals for one [`geocode_missing`] sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeReport {
    pub attempted: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub failed: usize,
}

/// Retries the geocoder for every hotel it has not answered for yet
///
/// Each hotel is tried once per sweep. Coordinates and the `geocoded` flag
/// are committed together; a hotel whose lookup or write fails stays
/// unflagged for the next sweep.
pub async fn geocode_missing<S: Storage, G: Geocoder>(
    storage: &mut S,
    geocoder: &G,
    config: &GeocoderConfig,
    pacing: DelayRange,
) -> Result<GeocodeReport> {
    let mut report = GeocodeReport::default();
    let mut tried = Vec::new();

    loop {
        let predicate = Predicate::all()
            .and(Condition::FlagIs(Flag::Geocoded, false))
            .and(Condition::IdNotIn(tried.clone()));
        let Some(row) = storage.select_random_row(Table::Hotel, &["id", "address"], &predicate)?
        else {
            break;
        };
        let Some(hotel_id) = row.id() else {
            break;
        };
        tried.push(hotel_id);
        report.attempted += 1;

        let address = row.get_str("address").unwrap_or(TEXT_SENTINEL);
        if address == TEXT_SENTINEL && config.address_override(hotel_id).is_none() {
            tracing::warn!("Hotel {} has no address to geocode", hotel_id);
            report.failed += 1;
            continue;
        }

        let point = match locate(geocoder, config, hotel_id, address).await {
            Ok(point) => point,
            Err(e) => {
                tracing::warn!("Geocoding hotel {} failed again: {}", hotel_id, e);
                report.failed += 1;
                pacing.pause().await;
                continue;
            }
        };

        let written = storage
            .update_columns(Table::Hotel, hotel_id, &coordinates(point))
            .and_then(|_| {
                storage.update_flag(Table::Hotel, Flag::Geocoded, true, &Predicate::id(hotel_id))
            })
            .and_then(|_| storage.commit());
        match written {
            Ok(()) if point.is_some() => report.resolved += 1,
            Ok(()) => report.unresolved += 1,
            Err(e) => {
                tracing::warn!("Storing coordinates of hotel {} failed: {}", hotel_id, e);
                storage.rollback()?;
                report.failed += 1;
            }
        }
        pacing.pause().await;
    }

    if report.attempted > 0 {
        tracing::info!(
            "Geocoding sweep: {} hotels tried, {} resolved, {} unresolved, {} failed",
            report.attempted,
            report.resolved,
            report.unresolved,
            report.failed
        );
    }
    Ok(report)
}

#[async_trait]
impl<G: Geocoder> CrawlStrategy for HotelStrategy<G> {
    fn class(&self) -> ResourceClass {
        ResourceClass::Hotel
    }

    fn schema(&self) -> &PageSchema {
        &self.schema
    }

    fn select<S: Storage>(&mut self, storage: &S) -> Result<Option<UnitOfWork>> {
        let Some(entity) = self.selector.next_eligible(storage, ResourceClass::Hotel)? else {
            return Ok(None);
        };

        let mut unit = UnitOfWork::for_entity(ResourceClass::Hotel, entity.id, entity.url);
        unit.reported_total = entity.review_count;
        Ok(Some(unit))
    }

    fn validate(
        &self,
        _unit: &UnitOfWork,
        extraction: &PageExtraction,
    ) -> std::result::Result<(), String> {
        let reader = FieldReader::new(&extraction.fields);
        if reader.text("name").is_none() {
            return Err("hotel name missing".to_string());
        }
        Ok(())
    }

    fn on_page_failure(&self, _unit: &UnitOfWork) -> PageFailure {
        PageFailure::Abandon
    }

    async fn build_rows(
        &mut self,
        unit: &mut UnitOfWork,
        _page: &LoadedPage,
        extraction: PageExtraction,
    ) -> Result<PageRows> {
        let Some(hotel_id) = unit.entity_id else {
            return Err(crate::HarvestError::Page {
                url: unit.url.clone(),
                message: "hotel unit without an entity id".to_string(),
            });
        };

        let reader = FieldReader::new(&extraction.fields);
        let name = reader.require_text("name")?;
        let address = reader.require_text("address")?;

        let mut record = Record::new()
            .with("id", hotel_id)
            .with("url", unit.url.as_str());

        for (column, kind) in SCRAPED_COLUMNS {
            record.set(column, typed_value(&reader, column, *kind));
        }
        record.set("name", name.as_str());
        record.set("address", address.as_str());

        let (price_min, price_max) = match reader.text(PRICE_RANGE_FIELD) {
            Some(text) => parse_price_range(&text).unzip(),
            None => (None, None),
        };
        record.set("price_range_min", price_min);
        record.set("price_range_max", price_max);

        for field in extraction.fields.keys() {
            let known = field == PRICE_RANGE_FIELD
                || SCRAPED_COLUMNS.iter().any(|(column, _)| column == field);
            if !known {
                tracing::debug!("Ignoring hotel field '{}' with no column", field);
            }
        }

        self.geocoded = None;
        let point = match locate(&self.geocoder, &self.geocoder_config, hotel_id, &address).await
        {
            Ok(point) => {
                self.geocoded = Some(hotel_id);
                point
            }
            Err(e) => {
                tracing::warn!("Geocoding hotel {} failed, will retry later: {}", hotel_id, e);
                None
            }
        };
        for (column, value) in coordinates(point).iter() {
            record.set(column, value.clone());
        }

        tracing::debug!("Hotel {} '{}' at {}", hotel_id, name, address);

        let mut rows = PageRows::default();
        rows.push(Table::Hotel, record);
        Ok(rows)
    }

    fn advance(&mut self, _unit: &UnitOfWork, _next_page: Option<String>) -> Advance {
        Advance::Finish
    }

    fn finish<S: Storage>(&mut self, storage: &mut S, unit: &UnitOfWork) -> Result<UnitOutcome> {
        let Some(hotel_id) = unit.entity_id else {
            return Ok(UnitOutcome::incomplete("no entity id"));
        };

        if unit.rows_persisted == 0 || unit.rows_failed > 0 {
            return Ok(UnitOutcome::incomplete(format!(
                "hotel row not persisted ({} failed)",
                unit.rows_failed
            )));
        }

        let updated = storage.update_flag(
            Table::ListingResult,
            Flag::HotelScraped,
            true,
            &Predicate::id(hotel_id),
        )?;
        if updated == 0 {
            storage.rollback()?;
            return Ok(UnitOutcome::incomplete("listing row disappeared"));
        }
        storage.update_flag(
            Table::Hotel,
            Flag::Geocoded,
            self.geocoded == Some(hotel_id),
            &Predicate::id(hotel_id),
        )?;
        storage.commit()?;

        Ok(UnitOutcome::Completed)
    }

    fn on_unit_end(&mut self, unit: &UnitOfWork, _outcome: &UnitOutcome) {
        if let Some(id) = unit.entity_id {
            self.selector.exclude(id);
        }
    }
}
