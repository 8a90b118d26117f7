/// Crawl phase definitions for a single unit of work
///
/// Every unit (one listing page, one hotel, one hotel's review pages) walks
/// through these phases; the transition table is the crawl state machine.
use std::fmt;

/// Represents the current phase of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Asking the work selector for the next eligible entity
    Select,

    /// Fetching the target page and checking its structural marker
    Load,

    /// Resource-class-specific sanity checks on the loaded page
    Validate,

    /// Pulling raw fields out of the page
    Extract,

    /// Upserting the extracted rows and committing the batch
    Persist,

    /// Deciding whether the unit continues with another page
    Advance,

    // ===== Terminal Phases =====
    /// Unit finished; flags (if any) were set by the finishing step
    Done,

    /// Unit abandoned without persisting or flagging
    Skipped,

    /// The work selector has no eligible entity left
    Exhausted,
}

impl CrawlPhase {
    /// Returns true if no further transitions are expected for the unit
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Exhausted)
    }

    /// Returns true if the transition `self -> next` is part of the machine
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        matches!(
            (self, next),
            (Select, Load)
                | (Select, Exhausted)
                | (Load, Validate)
                | (Load, Done)
                | (Load, Skipped)
                | (Validate, Extract)
                | (Validate, Done)
                | (Validate, Skipped)
                | (Extract, Persist)
                | (Extract, Skipped)
                | (Persist, Advance)
                | (Advance, Load)
                | (Advance, Done)
                | (Done, Select)
                | (Skipped, Select)
        )
    }

    /// Stable lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Extract => "extract",
            Self::Persist => "persist",
            Self::Advance => "advance",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
