//! External enrichment collaborators
//!
//! - `Geocoder`: address → coordinates, called once per hotel
//! - `LanguageDetector`: text → language code, called per review and response

mod geocode;
mod language;

pub use geocode::{GeoPoint, Geocoder, NoGeocoder, NominatimGeocoder};
pub use language::{LanguageDetector, UndeterminedLanguage};
