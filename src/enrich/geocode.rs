use crate::config::{GeocoderConfig, UserAgentConfig};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Coordinates of a resolved address
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Resolves a street address to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns `Ok(None)` when the address cannot be resolved
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, HarvestError>;
}

/// Geocoder that never resolves anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>, HarvestError> {
        Ok(None)
    }
}

/// Client for a Nominatim-compatible `/search` endpoint
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    /// Builds a geocoder with its own client and timeout
    pub fn new(
        config: &GeocoderConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, HarvestError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|source| HarvestError::Http {
                url: self.endpoint.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HarvestError::Geocode(format!(
                "HTTP {} for '{}'",
                response.status().as_u16(),
                address
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| HarvestError::Geocode(format!("bad response for '{}': {}", address, e)))?;

        let Some(hit) = hits.first() else {
            return Ok(None);
        };

        match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
            (Ok(latitude), Ok(longitude)) => Ok(Some(GeoPoint {
                latitude,
                longitude,
                altitude: None,
            })),
            _ => Err(HarvestError::Geocode(format!(
                "unparseable coordinates '{}', '{}'",
                hit.lat, hit.lon
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_agent() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn geocoder(server: &MockServer) -> NominatimGeocoder {
        let config = GeocoderConfig {
            endpoint: format!("{}/search", server.uri()),
            timeout_secs: 5,
            address_overrides: HashMap::new(),
        };
        NominatimGeocoder::new(&config, &user_agent()).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_first_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Via del Corso 1, Rome"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"lat":"41.9","lon":"12.5","display_name":"Via del Corso"}]"#,
            ))
            .mount(&server)
            .await;

        let point = geocoder(&server)
            .geocode("Via del Corso 1, Rome")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(point.latitude, 41.9);
        assert_eq!(point.longitude, 12.5);
        assert_eq!(point.altitude, None);
    }

    #[tokio::test]
    async fn test_no_hits_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let point = geocoder(&server).geocode("Nowhere").await.unwrap();
        assert!(point.is_none());
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = geocoder(&server).geocode("Anywhere").await;
        assert!(matches!(result, Err(HarvestError::Geocode(_))));
    }
}
