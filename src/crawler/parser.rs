//! Schema-driven HTML extraction
//!
//! This module handles parsing loaded pages to extract:
//! - The structural marker proving the page rendered
//! - Page-level fields (hotel details, reported review totals)
//! - Repeated items (listing rows, reviews) with their own fields
//! - The next-page link
//!
//! Values come out untyped; coercion belongs to the stage that consumes them.

use crate::config::{FieldSelector, PageSchema};
use crate::crawler::fetcher::LoadedPage;
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Errors raised while extracting a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Required field missing: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: String, value: String },

    #[error("Invalid selector: {0}")]
    Selector(String),
}

/// An untyped extracted value
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Text content or attribute value
    Text(String),

    /// Result of a presence check
    Flag(bool),

    /// Every match of a `multiple` selector
    List(Vec<String>),
}

/// Field name → value, `None` when the selector matched nothing
pub type RawRecord = BTreeMap<String, Option<RawValue>>;

/// Everything pulled from one page
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// Page-level fields
    pub fields: RawRecord,

    /// One record per repeated item
    pub items: Vec<RawRecord>,

    /// Absolute URL of the next page, if the control is present
    pub next_page: Option<String>,
}

/// Pulls raw field values out of a loaded page
pub trait PageExtractor: Send + Sync {
    /// Checks the page's structural marker
    fn has_marker(&self, page: &LoadedPage, schema: &PageSchema) -> Result<bool, ExtractError>;

    /// Extracts page fields, items, and the next-page link
    fn extract(
        &self,
        page: &LoadedPage,
        schema: &PageSchema,
    ) -> Result<PageExtraction, ExtractError>;
}

/// [`PageExtractor`] driven by CSS selectors from the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorExtractor;

impl PageExtractor for SelectorExtractor {
    fn has_marker(&self, page: &LoadedPage, schema: &PageSchema) -> Result<bool, ExtractError> {
        let document = Html::parse_document(&page.html);
        let marker = parse_selector(&schema.marker)?;
        let found = document.select(&marker).next().is_some();
        Ok(found)
    }

    fn extract(
        &self,
        page: &LoadedPage,
        schema: &PageSchema,
    ) -> Result<PageExtraction, ExtractError> {
        let document = Html::parse_document(&page.html);
        let root = document.root_element();

        let fields = extract_fields(root, &schema.fields)?;

        let mut items = Vec::new();
        if let Some(item_selector) = &schema.item {
            let item_selector = parse_selector(item_selector)?;
            for item in document.select(&item_selector) {
                items.push(extract_fields(item, &schema.item_fields)?);
            }
        }

        let next_page = match &schema.next_page {
            Some(selector) => find_next_page(&document, selector, &page.url)?,
            None => None,
        };

        Ok(PageExtraction {
            fields,
            items,
            next_page,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector(format!("{}: {:?}", selector, e)))
}

fn extract_fields(
    scope: ElementRef<'_>,
    fields: &BTreeMap<String, FieldSelector>,
) -> Result<RawRecord, ExtractError> {
    let mut record = RawRecord::new();
    for (name, field) in fields {
        record.insert(name.clone(), extract_field(scope, field)?);
    }
    Ok(record)
}

fn extract_field(
    scope: ElementRef<'_>,
    field: &FieldSelector,
) -> Result<Option<RawValue>, ExtractError> {
    let selector = parse_selector(&field.selector)?;
    let mut matches = scope.select(&selector);

    if field.presence {
        return Ok(Some(RawValue::Flag(matches.next().is_some())));
    }

    if field.multiple {
        let values: Vec<String> = matches
            .filter_map(|element| element_value(element, field.attribute.as_deref()))
            .collect();
        return Ok(if values.is_empty() {
            None
        } else {
            Some(RawValue::List(values))
        });
    }

    Ok(matches
        .find_map(|element| element_value(element, field.attribute.as_deref()))
        .map(RawValue::Text))
}

/// Reads an attribute or the whitespace-normalized text of an element
fn element_value(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    let value = match attribute {
        Some(name) => element.value().attr(name)?.trim().to_string(),
        None => element.text().collect::<Vec<_>>().join(" "),
    };
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn find_next_page(
    document: &Html,
    selector: &str,
    page_url: &str,
) -> Result<Option<String>, ExtractError> {
    let selector = parse_selector(selector)?;
    let Some(href) = document
        .select(&selector)
        .find_map(|element| element.value().attr("href"))
    else {
        return Ok(None);
    };

    let base = Url::parse(page_url).map_err(|e| ExtractError::InvalidField {
        field: "page_url".to_string(),
        value: format!("{} ({})", page_url, e),
    })?;

    // A disabled control often keeps a dead href
    if href.trim().starts_with('#') {
        return Ok(None);
    }
    let Ok(next) = resolve_link(href, &base) else {
        return Ok(None);
    };

    let mut current = base;
    current.set_fragment(None);
    if next == current {
        return Ok(None);
    }
    Ok(Some(next.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(selector: &str) -> FieldSelector {
        FieldSelector {
            selector: selector.to_string(),
            attribute: None,
            presence: false,
            multiple: false,
        }
    }

    fn listing_schema() -> PageSchema {
        let mut item_fields = BTreeMap::new();
        item_fields.insert(
            "url".to_string(),
            FieldSelector {
                attribute: Some("href".to_string()),
                ..field("a.title")
            },
        );
        item_fields.insert("reviews".to_string(), field("span.reviews"));
        item_fields.insert(
            "sponsored".to_string(),
            FieldSelector {
                presence: true,
                ..field(".sponsored")
            },
        );
        PageSchema {
            marker: "div.results".to_string(),
            item: Some("div.listItem".to_string()),
            fields: BTreeMap::new(),
            item_fields,
            next_page: Some("a.next".to_string()),
        }
    }

    const LISTING_HTML: &str = r#"
        <html><body><div class="results">
          <div class="listItem">
            <a class="title" href="/Hotel_Review-d1.html?x=1">Hotel One</a>
            <span class="reviews">1,234 reviews</span>
          </div>
          <div class="listItem">
            <span class="sponsored">Sponsored</span>
            <a class="title" href="/Hotel_Review-d2.html">Hotel Two</a>
          </div>
        </div>
        <a class="next" href="/Hotels-oa30.html">Next</a>
        </body></html>
    "#;

    fn page(html: &str) -> LoadedPage {
        LoadedPage::new("https://www.example.com/Hotels-oa0.html", html)
    }

    #[test]
    fn test_marker_present_and_absent() {
        let schema = listing_schema();
        assert!(SelectorExtractor
            .has_marker(&page(LISTING_HTML), &schema)
            .unwrap());
        assert!(!SelectorExtractor
            .has_marker(&page("<html><body>Loading...</body></html>"), &schema)
            .unwrap());
    }

    #[test]
    fn test_extract_items() {
        let extraction = SelectorExtractor
            .extract(&page(LISTING_HTML), &listing_schema())
            .unwrap();

        assert_eq!(extraction.items.len(), 2);
        let first = &extraction.items[0];
        assert_eq!(
            first["url"],
            Some(RawValue::Text("/Hotel_Review-d1.html?x=1".to_string()))
        );
        assert_eq!(
            first["reviews"],
            Some(RawValue::Text("1,234 reviews".to_string()))
        );
        assert_eq!(first["sponsored"], Some(RawValue::Flag(false)));

        let second = &extraction.items[1];
        assert_eq!(second["sponsored"], Some(RawValue::Flag(true)));
        assert_eq!(second["reviews"], None);
    }

    #[test]
    fn test_next_page_resolved() {
        let extraction = SelectorExtractor
            .extract(&page(LISTING_HTML), &listing_schema())
            .unwrap();
        assert_eq!(
            extraction.next_page.as_deref(),
            Some("https://www.example.com/Hotels-oa30.html")
        );
    }

    #[test]
    fn test_next_page_absent() {
        let html = r#"<div class="results"></div>"#;
        let extraction = SelectorExtractor
            .extract(&page(html), &listing_schema())
            .unwrap();
        assert!(extraction.next_page.is_none());
        assert!(extraction.items.is_empty());
    }

    #[test]
    fn test_multiple_and_whitespace() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "amenities".to_string(),
            FieldSelector {
                multiple: true,
                ..field("li")
            },
        );
        fields.insert("name".to_string(), field("h1"));
        let schema = PageSchema {
            marker: "h1".to_string(),
            item: None,
            fields,
            item_fields: BTreeMap::new(),
            next_page: None,
        };
        let html =
            "<h1>  Hotel\n   Foo </h1><ul><li>Pool</li><li> Free  WiFi </li><li> </li></ul>";

        let extraction = SelectorExtractor.extract(&page(html), &schema).unwrap();
        assert_eq!(
            extraction.fields["name"],
            Some(RawValue::Text("Hotel Foo".to_string()))
        );
        assert_eq!(
            extraction.fields["amenities"],
            Some(RawValue::List(vec!["Pool".to_string(), "Free WiFi".to_string()]))
        );
    }

    #[test]
    fn test_javascript_next_link_ignored() {
        let html =
            r#"<div class="results"></div><a class="next" href="javascript:void(0)">Next</a>"#;
        let extraction = SelectorExtractor
            .extract(&page(html), &listing_schema())
            .unwrap();
        assert!(extraction.next_page.is_none());
    }

    #[test]
    fn test_dead_next_links_ignored() {
        for href in ["#", "#top", "/Hotels-oa0.html", "/Hotels-oa0.html#REVIEWS"] {
            let html = format!(
                r#"<div class="results"></div><a class="next" href="{}">Next</a>"#,
                href
            );
            let extraction = SelectorExtractor
                .extract(&page(&html), &listing_schema())
                .unwrap();
            assert!(extraction.next_page.is_none(), "href {}", href);
        }
    }
}
