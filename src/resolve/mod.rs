//! Permission resolution
//!
//! The matcher turns a provider catalog into permissions for one command;
//! the resolver decides which source of permissions to trust.

pub mod matcher;
pub mod resolver;

use std::collections::BTreeSet;
use std::fmt;

pub use matcher::{classify, MatchPolicy, OperationMatcher, Plane};
pub use resolver::{infer_permissions, LiveSources, Resolver};

/// How much to trust a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// Verified against the live provider catalog
    High,
    /// From an exact cache entry
    Medium,
    /// Partial cache match or inferred from the verb
    Low,
}

impl Confidence {
    /// Short label used in output headers
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// What the level means
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::High => "verified against live provider catalog",
            Self::Medium => "cached mapping",
            Self::Low => "inferred",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Live provider operations catalog
    Live,
    /// Exact cache entry
    Cache,
    /// Cache entry matched by service prefix and operation substring
    PartialCache,
    /// Synthesized from the CLI verb
    Inference,
    /// Nothing matched
    Unresolved,
}

impl Tier {
    /// Confidence attached to results from this tier
    #[must_use]
    pub const fn confidence(self) -> Confidence {
        match self {
            Self::Live => Confidence::High,
            Self::Cache => Confidence::Medium,
            Self::PartialCache | Self::Inference | Self::Unresolved => Confidence::Low,
        }
    }
}

/// Outcome of resolving one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Permission strings, deduplicated and sorted
    pub permissions: BTreeSet<String>,
    /// Tier that answered
    pub tier: Tier,
}

impl Resolution {
    /// True when no tier produced anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
