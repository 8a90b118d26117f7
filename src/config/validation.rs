use crate::config::types::{
    Config, CrawlerConfig, GeocoderConfig, OutputConfig, PageSchema, SchemaConfig, SiteConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_site_config(&config.site)?;
    validate_schemas(&config.schema)?;
    validate_geocoder_config(&config.geocoder)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_load_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_load_attempts must be >= 1, got {}",
            config.max_load_attempts
        )));
    }

    if config.next_page_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "next_page_attempts must be >= 1, got {}",
            config.next_page_attempts
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if let Some(max) = config.max_hotel_reviews {
        if max <= config.min_hotel_reviews {
            return Err(ConfigError::Validation(format!(
                "max_hotel_reviews ({}) must be greater than min_hotel_reviews ({})",
                max, config.min_hotel_reviews
            )));
        }
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.max_unit_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_unit_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("database_path", &config.database_path),
        ("test_database_path", &config.test_database_path),
        ("log_directory", &config.log_directory),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.database_path == config.test_database_path {
        return Err(ConfigError::Validation(
            "test_database_path must differ from database_path".to_string(),
        ));
    }

    Ok(())
}

/// Validates the listing URL template
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if !config.listing_url_template.contains("{offset}") {
        return Err(ConfigError::Validation(format!(
            "listing_url_template must contain an {{offset}} placeholder, got '{}'",
            config.listing_url_template
        )));
    }

    let url = Url::parse(&config.listing_url(0)).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid listing_url_template '{}': {}",
            config.listing_url_template, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "listing_url_template must use HTTP(S), got '{}'",
            url.scheme()
        )));
    }

    if config.listing_page_size < 1 {
        return Err(ConfigError::Validation(
            "listing_page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the three page schemas and their required fields
fn validate_schemas(config: &SchemaConfig) -> Result<(), ConfigError> {
    validate_page_schema("listing", &config.listing)?;
    validate_page_schema("hotel", &config.hotel)?;
    validate_page_schema("review", &config.review)?;

    require_item("listing", &config.listing)?;
    require_fields("listing", &config.listing.item_fields, &["url"])?;

    require_fields("hotel", &config.hotel.fields, &["name", "address"])?;

    require_item("review", &config.review)?;
    require_fields("review", &config.review.item_fields, &["url", "text", "user_url"])?;

    Ok(())
}

fn validate_page_schema(name: &str, schema: &PageSchema) -> Result<(), ConfigError> {
    validate_selector(&format!("schema.{}.marker", name), &schema.marker)?;

    if let Some(item) = &schema.item {
        validate_selector(&format!("schema.{}.item", name), item)?;
    }

    if let Some(next) = &schema.next_page {
        validate_selector(&format!("schema.{}.next-page", name), next)?;
    }

    for (field, selector) in schema.fields.iter().chain(schema.item_fields.iter()) {
        validate_selector(&format!("schema.{}.{}", name, field), &selector.selector)?;
        if selector.presence && selector.multiple {
            return Err(ConfigError::Validation(format!(
                "schema.{}.{} cannot be both presence and multiple",
                name, field
            )));
        }
    }

    if !schema.item_fields.is_empty() && schema.item.is_none() {
        return Err(ConfigError::Validation(format!(
            "schema.{} declares item-fields without an item selector",
            name
        )));
    }

    Ok(())
}

fn require_item(name: &str, schema: &PageSchema) -> Result<(), ConfigError> {
    if schema.item.is_none() {
        return Err(ConfigError::Validation(format!(
            "schema.{} must declare an item selector",
            name
        )));
    }
    Ok(())
}

fn require_fields(
    name: &str,
    fields: &std::collections::BTreeMap<String, crate::config::types::FieldSelector>,
    required: &[&str],
) -> Result<(), ConfigError> {
    for field in required {
        if !fields.contains_key(*field) {
            return Err(ConfigError::Validation(format!(
                "schema.{} must declare field '{}'",
                name, field
            )));
        }
    }
    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(location: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", location, selector, e)))
}

/// Validates geocoder configuration
fn validate_geocoder_config(config: &GeocoderConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid geocoder endpoint: {}", e)))?;

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "geocoder timeout_secs must be >= 1".to_string(),
        ));
    }

    for key in config.address_overrides.keys() {
        if key.parse::<i64>().is_err() {
            return Err(ConfigError::Validation(format!(
                "address override key '{}' is not a hotel id",
                key
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
