//! Per-unit value object carried through the crawl machine
//!
//! All mutable scraping context for one unit of work lives here and is
//! dropped when the unit finishes; nothing survives across units except what
//! was persisted.

use crate::state::CrawlPhase;
use crate::HarvestError;
use std::collections::HashSet;
use std::fmt;

/// The category of crawl target a worker processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Search-result pages
    Listing,

    /// Hotel detail pages
    Hotel,

    /// Paginated hotel review pages
    Review,
}

impl ResourceClass {
    /// Converts the resource class to its stored/CLI representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Hotel => "hotels",
            Self::Review => "reviews",
        }
    }

    /// Parses the stored/CLI representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "hotels" => Some(Self::Hotel),
            "reviews" => Some(Self::Review),
            _ => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Listing, Self::Hotel, Self::Review]
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How a unit of work ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Data committed and the completion flag (if any) set
    Completed,

    /// Data committed but completion could not be verified; left unflagged
    Incomplete { reason: String },

    /// Nothing flagged; the unit will be selected again on a future run
    Skipped { reason: String },
}

impl UnitOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn incomplete(reason: impl Into<String>) -> Self {
        Self::Incomplete {
            reason: reason.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One unit of work: a listing page, a hotel, or a hotel's review pages
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    /// Resource class driving this unit
    pub class: ResourceClass,

    /// Selected `ListingResult` id (absent for listing pages)
    pub entity_id: Option<i64>,

    /// Listing page index (listing units only)
    pub listing_page: Option<u32>,

    /// URL of the page currently being processed
    pub url: String,

    /// Pages loaded so far within this unit
    pub pages_loaded: u32,

    /// Site-reported total, captured for reconciliation
    pub reported_total: Option<i64>,

    /// Rows upserted across all pages of the unit
    pub rows_persisted: usize,

    /// Rows whose id was not present before the upsert
    pub rows_created: usize,

    /// Rows abandoned during extraction or persistence
    pub rows_failed: usize,

    /// Pages already loaded by this unit, without fragments
    visited: HashSet<String>,

    phase: CrawlPhase,
}

impl UnitOfWork {
    /// Creates a unit for a selected entity
    pub fn for_entity(class: ResourceClass, entity_id: i64, url: impl Into<String>) -> Self {
        Self::new(class, Some(entity_id), None, url.into())
    }

    /// Creates a unit for a listing page
    pub fn for_listing_page(page: u32, url: impl Into<String>) -> Self {
        Self::new(ResourceClass::Listing, None, Some(page), url.into())
    }

    fn new(
        class: ResourceClass,
        entity_id: Option<i64>,
        listing_page: Option<u32>,
        url: String,
    ) -> Self {
        Self {
            class,
            entity_id,
            listing_page,
            url,
            pages_loaded: 0,
            reported_total: None,
            rows_persisted: 0,
            rows_created: 0,
            rows_failed: 0,
            visited: HashSet::new(),
            phase: CrawlPhase::Select,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Moves the unit to `next`, rejecting transitions outside the machine
    pub fn transition(&mut self, next: CrawlPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!(unit = %self.label(), "{} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Remembers the current page as loaded
    pub fn mark_visited(&mut self) {
        let key = page_key(&self.url).to_string();
        self.visited.insert(key);
    }

    /// Returns true if `url` names a page this unit already loaded
    pub fn has_visited(&self, url: &str) -> bool {
        self.visited.contains(page_key(url))
    }

    /// Human-readable identifier for logs
    pub fn label(&self) -> String {
        match (self.entity_id, self.listing_page) {
            (Some(id), _) => format!("{} #{}", self.class, id),
            (None, Some(page)) => format!("{} page {}", self.class, page),
            (None, None) => self.class.to_string(),
        }
    }
}

fn page_key(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}
