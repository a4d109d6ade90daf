//! Shared data model for the case intelligence engine.
//!
//! One model serves all four analysis subsystems (violation detection,
//! timeline, actor registry, contradiction detection). Records are immutable
//! once created — re-scoring supersedes a violation rather than mutating it,
//! and actors are merged rather than deleted.

pub mod enums;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use enums::{
    AnnotationKind, DatePrecision, EventType, RiskTier, SubjectType, ViolationCategory,
    ViolationSource,
};

/// Namespace for all deterministic (v5) identifiers minted by this crate.
pub const CASELENS_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9a44_2d7b_4e0e_8a35_c1d2_90ab_41e7);

/// Derive the per-case UUID namespace from a case id.
pub fn case_namespace(case_id: &str) -> Uuid {
    Uuid::new_v5(&CASELENS_NAMESPACE, case_id.as_bytes())
}

// ---------------------------------------------------------------------------
// CharRange
// ---------------------------------------------------------------------------

/// Half-open character range `[start, end)` into a document's text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharRange {
    pub start: usize,
    pub end: usize,
}

impl CharRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Length of the intersection with another range.
    pub fn overlap_len(&self, other: &CharRange) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    /// Overlap as a fraction of the shorter range. Empty ranges never overlap.
    pub fn overlap_fraction(&self, other: &CharRange) -> f64 {
        let shorter = self.len().min(other.len());
        if shorter == 0 {
            return 0.0;
        }
        self.overlap_len(other) as f64 / shorter as f64
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &CharRange) -> CharRange {
        CharRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Maps a character range of the extracted text back to a source page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageOffset {
    pub page: u32,
    pub range: CharRange,
}

/// An ingested document. Identity is the SHA-256 of the text, so re-uploading
/// identical content resolves to the same record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Hex-encoded content hash.
    pub id: String,
    pub case_id: String,
    pub text: String,
    pub page_offsets: Vec<PageOffset>,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// The source page containing a character offset, if provenance was supplied.
    pub fn page_for_offset(&self, offset: usize) -> Option<u32> {
        self.page_offsets
            .iter()
            .find(|p| p.range.start <= offset && offset < p.range.end)
            .map(|p| p.page)
    }
}

// ---------------------------------------------------------------------------
// Violation
// ---------------------------------------------------------------------------

/// A detected procedural/constitutional issue within one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub id: Uuid,
    pub document_id: String,
    pub category: ViolationCategory,
    /// Name of the pattern rule that fired, when the pattern lane contributed.
    pub rule: Option<String>,
    pub description: String,
    /// Ordered 1–5 scale; see `SeverityWeights`.
    pub severity: u8,
    pub excerpt: String,
    pub char_range: CharRange,
    pub source: ViolationSource,
    /// 0–1. Pattern rules are exact by construction (1.0).
    pub confidence: f64,
}

impl Violation {
    /// Deterministic identity: same document, span, and category always yield
    /// the same id, so re-detection supersedes rather than duplicates.
    pub fn deterministic_id(document_id: &str, range: CharRange, category: ViolationCategory) -> Uuid {
        let key = format!("{document_id}:{}:{}:{}", range.start, range.end, category.as_str());
        Uuid::new_v5(&CASELENS_NAMESPACE, key.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// TimelineEvent
// ---------------------------------------------------------------------------

/// An event extracted during timeline construction.
///
/// `date` is `None` when the source text was unparseable or ambiguous — such
/// events are excluded from chronological ordering but retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub case_id: String,
    pub date: Option<NaiveDate>,
    pub precision: DatePrecision,
    /// The date expression as written in the document.
    pub raw_date: String,
    pub description: String,
    pub document_id: String,
    pub char_range: CharRange,
    pub event_type: EventType,
}

impl TimelineEvent {
    /// Composite ordering key. Dated events order before dateless ones;
    /// `(document_id, char_range.start)` breaks ties deterministically.
    pub fn ordering_key(&self) -> (u8, Option<NaiveDate>, String, usize) {
        let dated = if self.date.is_some() { 0 } else { 1 };
        (dated, self.date, self.document_id.clone(), self.char_range.start)
    }

    /// Dedupe key for idempotent merge.
    pub fn dedupe_key(&self) -> (String, CharRange) {
        (self.document_id.clone(), self.char_range)
    }
}

// ---------------------------------------------------------------------------
// GapFinding
// ---------------------------------------------------------------------------

/// A timeline annotation: elapsed time between two linked events exceeded a
/// configured statutory deadline. Not a `Violation` by default — it may be
/// promoted to one through the same severity-weight mechanism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GapFinding {
    pub id: Uuid,
    pub case_id: String,
    pub from_event_id: Uuid,
    pub to_event_id: Uuid,
    pub from_type: EventType,
    pub to_type: EventType,
    pub elapsed_days: i64,
    pub max_days: i64,
    pub description: String,
    /// Severity a promoted violation would carry.
    pub severity: u8,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// A `(document, range)` locator for one actor mention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MentionRef {
    pub document_id: String,
    pub char_range: CharRange,
}

/// A real-world participant tracked across documents.
///
/// Risk score and tier are never stored here — they are a pure projection of
/// `violation_refs`, recomputed on read (`ActorRegistry::recompute_risk`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: Uuid,
    pub display_name: String,
    pub normalized_name: String,
    pub role: enums::ActorRole,
    pub mention_refs: BTreeSet<MentionRef>,
    pub violation_refs: BTreeSet<Uuid>,
}

impl Actor {
    /// Deterministic per-case identity from normalized name + role.
    pub fn identity(case_id: &str, normalized_name: &str, role: enums::ActorRole) -> Uuid {
        let ns = case_namespace(case_id);
        let key = format!("{normalized_name}:{}", role.as_str());
        Uuid::new_v5(&ns, key.as_bytes())
    }
}

/// Read-side projection of an actor with its derived risk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorView {
    pub actor: Actor,
    pub risk_score: f64,
    pub risk_tier: RiskTier,
}

// ---------------------------------------------------------------------------
// Contradiction
// ---------------------------------------------------------------------------

/// One side of a detected factual inconsistency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Claim {
    pub document_id: String,
    pub char_range: CharRange,
    pub normalized_value: String,
}

/// A detected factual inconsistency between documents about one subject.
/// Claims are stored sorted by `(document_id, char_range)` so detection is
/// symmetric and deduplication is stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contradiction {
    pub id: Uuid,
    pub case_id: String,
    pub subject_type: SubjectType,
    /// Stable grouping key, e.g. `incident:removal` or a normalized actor name.
    pub subject_key: String,
    pub field_key: String,
    pub claims: Vec<Claim>,
    pub confidence: f64,
    pub description: String,
}

impl Contradiction {
    /// Deterministic identity from the sorted claim locators.
    pub fn deterministic_id(case_id: &str, subject_key: &str, field_key: &str, claims: &[Claim]) -> Uuid {
        let ns = case_namespace(case_id);
        let mut key = format!("{subject_key}:{field_key}");
        for c in claims {
            key.push_str(&format!(
                ":{}:{}:{}",
                c.document_id, c.char_range.start, c.char_range.end
            ));
        }
        Uuid::new_v5(&ns, key.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// DocumentAnnotation
// ---------------------------------------------------------------------------

/// Visible record of skipped or degraded analysis — never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentAnnotation {
    pub document_id: String,
    pub kind: AnnotationKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// CaseSnapshot
// ---------------------------------------------------------------------------

/// The complete, atomically-published view of one case.
///
/// A snapshot is the unit of persistence: serializing and loading it back
/// reproduces an identical case state. Maps are ordered so the serialized
/// form is stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSnapshot {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Ingestion order.
    pub document_ids: Vec<String>,
    pub documents: std::collections::BTreeMap<String, Document>,
    pub violations: Vec<Violation>,
    pub events: Vec<TimelineEvent>,
    pub gap_findings: Vec<GapFinding>,
    pub actors: std::collections::BTreeMap<Uuid, Actor>,
    pub contradictions: Vec<Contradiction>,
    pub annotations: Vec<DocumentAnnotation>,
}

impl CaseSnapshot {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            created_at: Utc::now(),
            document_ids: Vec::new(),
            documents: std::collections::BTreeMap::new(),
            violations: Vec::new(),
            events: Vec::new(),
            gap_findings: Vec::new(),
            actors: std::collections::BTreeMap::new(),
            contradictions: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Every violation, event, and mention must reference a document that
    /// belongs to this case.
    pub fn check_consistency(&self) -> Result<(), String> {
        for v in &self.violations {
            if !self.documents.contains_key(&v.document_id) {
                return Err(format!(
                    "violation {} references unknown document {}",
                    v.id, v.document_id
                ));
            }
        }
        for e in &self.events {
            if !self.documents.contains_key(&e.document_id) {
                return Err(format!(
                    "event {} references unknown document {}",
                    e.id, e.document_id
                ));
            }
        }
        for actor in self.actors.values() {
            for m in &actor.mention_refs {
                if !self.documents.contains_key(&m.document_id) {
                    return Err(format!(
                        "actor {} mentions unknown document {}",
                        actor.id, m.document_id
                    ));
                }
            }
        }
        Ok(())
    }
}
