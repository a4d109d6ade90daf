//! Closed enums shared across the engine.
//!
//! Every classification that the original analysis used loose string tags for
//! is a tagged variant here, so adding a category is a compile-time-checked
//! change and every consumer matches exhaustively.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ViolationCategory
// ---------------------------------------------------------------------------

/// Legal category of a detected violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationCategory {
    Constitutional,
    DueProcess,
    Procedural,
    CpsSpecific,
    Custody,
}

impl ViolationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constitutional => "constitutional",
            Self::DueProcess => "due-process",
            Self::Procedural => "procedural",
            Self::CpsSpecific => "cps-specific",
            Self::Custody => "custody",
        }
    }

    pub fn all() -> [ViolationCategory; 5] {
        [
            Self::Constitutional,
            Self::DueProcess,
            Self::Procedural,
            Self::CpsSpecific,
            Self::Custody,
        ]
    }

    /// Parse a category label as reported by the AI reasoning service.
    /// Tolerant of separator variants; unknown labels are rejected.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace([' ', '_'], "-").as_str() {
            "constitutional" => Some(Self::Constitutional),
            "due-process" => Some(Self::DueProcess),
            "procedural" => Some(Self::Procedural),
            "cps-specific" | "cps" => Some(Self::CpsSpecific),
            "custody" => Some(Self::Custody),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ViolationSource
// ---------------------------------------------------------------------------

/// Which detection lane produced a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationSource {
    PatternMatch,
    AiAssisted,
    Both,
}

impl ViolationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternMatch => "pattern-match",
            Self::AiAssisted => "ai-assisted",
            Self::Both => "both",
        }
    }

    /// Combine the sources of two fused candidates.
    pub fn fuse(self, other: ViolationSource) -> ViolationSource {
        if self == other {
            self
        } else {
            Self::Both
        }
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Kind of a timeline event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Filing,
    Hearing,
    Order,
    Deadline,
    Incident,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filing => "filing",
            Self::Hearing => "hearing",
            Self::Order => "order",
            Self::Deadline => "deadline",
            Self::Incident => "incident",
        }
    }
}

// ---------------------------------------------------------------------------
// ActorRole
// ---------------------------------------------------------------------------

/// Role of a tracked participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Judge,
    Attorney,
    Caseworker,
    Parent,
    Other,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Judge => "judge",
            Self::Attorney => "attorney",
            Self::Caseworker => "caseworker",
            Self::Parent => "parent",
            Self::Other => "other",
        }
    }
}

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// Discrete classification of an actor's aggregated violation exposure.
/// Ordered so `min_tier` filters compare directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// SubjectType
// ---------------------------------------------------------------------------

/// What a contradiction is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Actor,
    Event,
    Fact,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Event => "event",
            Self::Fact => "fact",
        }
    }
}

// ---------------------------------------------------------------------------
// DatePrecision
// ---------------------------------------------------------------------------

/// How precisely a date was stated in the source text.
/// A relative phrase lowers contradiction confidence relative to an exact date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Exact,
    Relative,
}

// ---------------------------------------------------------------------------
// AnnotationKind
// ---------------------------------------------------------------------------

/// Visible record of degraded or skipped analysis on a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// The AI-assisted lane was unavailable; pattern-lane results only.
    AiLaneDegraded,
    /// A date string could not be parsed; the event was kept without a date.
    DateSkipped,
    /// The contradiction re-check failed; it will be retried on next ingestion.
    ContradictionCheckFailed,
}

// ---------------------------------------------------------------------------
// DocumentKind
// ---------------------------------------------------------------------------

/// Coarse classification of a legal document, used to select which
/// pattern groups apply during violation detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Petition,
    Motion,
    Order,
    Pleading,
    Evidence,
    Custody,
    Cps,
    ServicePlan,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Petition => "petition",
            Self::Motion => "motion",
            Self::Order => "order",
            Self::Pleading => "pleading",
            Self::Evidence => "evidence",
            Self::Custody => "custody",
            Self::Cps => "cps",
            Self::ServicePlan => "service_plan",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_accepts_separator_variants() {
        assert_eq!(
            ViolationCategory::parse("due process"),
            Some(ViolationCategory::DueProcess)
        );
        assert_eq!(
            ViolationCategory::parse("CPS_SPECIFIC"),
            Some(ViolationCategory::CpsSpecific)
        );
        assert_eq!(ViolationCategory::parse("tort"), None);
    }

    #[test]
    fn source_fusion() {
        assert_eq!(
            ViolationSource::PatternMatch.fuse(ViolationSource::AiAssisted),
            ViolationSource::Both
        );
        assert_eq!(
            ViolationSource::PatternMatch.fuse(ViolationSource::PatternMatch),
            ViolationSource::PatternMatch
        );
    }

    #[test]
    fn risk_tier_ordering() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn enum_serialization_roundtrip() {
        for cat in ViolationCategory::all() {
            let json = serde_json::to_string(&cat).unwrap();
            let back: ViolationCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, cat);
        }
        let json = serde_json::to_string(&ViolationCategory::DueProcess).unwrap();
        assert_eq!(json, "\"due-process\"");
    }
}
