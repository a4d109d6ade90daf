//! Case Aggregator: incremental ingestion and atomic snapshot publication.
//!
//! Each case's published state is an `Arc<CaseSnapshot>` swapped in one
//! write-lock acquisition, so readers always see either the previous complete
//! snapshot or the new one, never a half-updated case. Ingestions into the
//! same case are serialized by a per-case mutex; different cases proceed in
//! parallel. A document's identity is the SHA-256 of its text — re-ingesting
//! identical content is a no-op, which makes ingestion safely restartable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::actors::{extract_mentions, ActorRegistry};
use crate::config::EngineConfig;
use crate::contradiction::ContradictionDetector;
use crate::detection::DetectionEngine;
use crate::error::EngineError;
use crate::models::enums::{AnnotationKind, DatePrecision, RiskTier, ViolationCategory};
use crate::models::{
    ActorView, CaseSnapshot, Contradiction, Document, DocumentAnnotation, GapFinding, PageOffset,
    TimelineEvent, Violation,
};
use crate::reasoning::ReasoningService;
use crate::search::SearchIndex;
use crate::snapshot::SnapshotStore;
use crate::timeline::{promote_gap, TimelineEngine};

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

/// One document offered for ingestion.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub case_id: String,
    pub text: String,
    /// Page provenance for the extracted text, when the caller has it.
    pub page_offsets: Vec<PageOffset>,
}

/// What one ingestion changed.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub document_id: String,
    /// Identical content was already part of the case; nothing changed.
    pub duplicate: bool,
    pub violations_added: usize,
    pub events_added: usize,
    pub contradictions_added: usize,
    pub annotations: Vec<DocumentAnnotation>,
}

/// Read-side filter over a case's violations.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub category: Option<ViolationCategory>,
    pub min_severity: Option<u8>,
    pub document_id: Option<String>,
}

impl ViolationFilter {
    fn matches(&self, v: &Violation) -> bool {
        self.category.is_none_or(|c| v.category == c)
            && self.min_severity.is_none_or(|s| v.severity >= s)
            && self
                .document_id
                .as_deref()
                .is_none_or(|d| v.document_id == d)
    }
}

// ---------------------------------------------------------------------------
// CaseStore
// ---------------------------------------------------------------------------

pub struct CaseStore {
    config: Arc<EngineConfig>,
    detection: DetectionEngine,
    timeline: TimelineEngine,
    registry: ActorRegistry,
    contradiction: ContradictionDetector,
    search: SearchIndex,
    /// Optional durability; `None` keeps cases in memory only.
    store: Option<SnapshotStore>,
    published: RwLock<HashMap<String, Arc<CaseSnapshot>>>,
    ingest_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CaseStore {
    pub fn new(
        config: EngineConfig,
        reasoning: Option<Box<dyn ReasoningService>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            detection: DetectionEngine::new(Arc::clone(&config), reasoning),
            timeline: TimelineEngine::new(Arc::clone(&config)),
            registry: ActorRegistry::new(Arc::clone(&config)),
            contradiction: ContradictionDetector::new(Arc::clone(&config)),
            search: SearchIndex::new(Arc::clone(&config)),
            store: None,
            published: RwLock::new(HashMap::new()),
            ingest_locks: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Construct with the blocking HTTP reasoning client described by the
    /// config's AI section.
    pub fn with_http_reasoning(config: EngineConfig) -> Result<Self, EngineError> {
        let client = crate::reasoning::HttpReasoningClient::new(&config.ai)?;
        Self::new(config, Some(Box::new(client)))
    }

    /// Attach a snapshot store; every publication is also persisted there.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Case lifecycle ─────────────────────────────────────────────────

    pub fn create_case(&self, case_id: &str, name: &str) -> Result<(), EngineError> {
        if case_id.trim().is_empty() {
            return Err(EngineError::MalformedInput("case id must not be empty".into()));
        }
        let mut published = self.published.write().map_err(|_| EngineError::LockPoisoned)?;
        if published.contains_key(case_id) {
            return Err(EngineError::DataConsistency(format!(
                "case '{case_id}' already exists"
            )));
        }
        let snapshot = CaseSnapshot::new(case_id.to_string(), name.to_string());
        if let Some(store) = &self.store {
            store.save(&snapshot)?;
        }
        published.insert(case_id.to_string(), Arc::new(snapshot));
        tracing::info!(case_id, name, "case created");
        Ok(())
    }

    /// Bring a persisted case back into the published map.
    pub fn restore_case(&self, case_id: &str) -> Result<(), EngineError> {
        let store = self.store.as_ref().ok_or_else(|| {
            EngineError::Configuration("no snapshot store attached".into())
        })?;
        let snapshot = store.load(case_id)?;
        snapshot
            .check_consistency()
            .map_err(EngineError::DataConsistency)?;
        let mut published = self.published.write().map_err(|_| EngineError::LockPoisoned)?;
        published.insert(case_id.to_string(), Arc::new(snapshot));
        Ok(())
    }

    pub fn case_ids(&self) -> Result<Vec<String>, EngineError> {
        let published = self.published.read().map_err(|_| EngineError::LockPoisoned)?;
        let mut ids: Vec<String> = published.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// The current complete view of a case. Cheap: clones an `Arc`.
    pub fn snapshot(&self, case_id: &str) -> Result<Arc<CaseSnapshot>, EngineError> {
        let published = self.published.read().map_err(|_| EngineError::LockPoisoned)?;
        published
            .get(case_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCase(case_id.to_string()))
    }

    // ── Ingestion ──────────────────────────────────────────────────────

    /// Ingest one document: violation detection, timeline extraction, actor
    /// resolution, and contradiction checks, then one atomic publication.
    /// Concurrent ingestions into the same case are serialized.
    pub fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, EngineError> {
        if request.text.trim().is_empty() {
            return Err(EngineError::MalformedInput("document text is empty".into()));
        }

        let case_lock = self.case_lock(&request.case_id)?;
        let _guard = case_lock.lock().map_err(|_| EngineError::LockPoisoned)?;

        let mut snapshot = (*self.snapshot(&request.case_id)?).clone();

        let document_id = content_hash(&request.text);
        if snapshot.documents.contains_key(&document_id) {
            tracing::info!(case_id = %request.case_id, document_id, "duplicate content, ingestion is a no-op");
            return Ok(IngestOutcome {
                document_id,
                duplicate: true,
                violations_added: 0,
                events_added: 0,
                contradictions_added: 0,
                annotations: Vec::new(),
            });
        }

        let document = Document {
            id: document_id.clone(),
            case_id: request.case_id.clone(),
            text: request.text,
            page_offsets: request.page_offsets,
            ingested_at: Utc::now(),
        };

        let mut annotations = Vec::new();

        // Violation detection (both lanes, fused).
        let detection = self.detection.detect(&document);
        if let Some(reason) = detection.ai_degraded {
            annotations.push(DocumentAnnotation {
                document_id: document_id.clone(),
                kind: AnnotationKind::AiLaneDegraded,
                message: reason,
            });
        }
        let violations_added = merge_violations(&mut snapshot.violations, detection.violations);

        // Timeline extraction. Relative dates resolve against the case's
        // anchor; a first pass may itself establish that anchor.
        let anchor = filing_anchor(&snapshot.events);
        let mut extraction = self.timeline.extract_events(&document, anchor);
        if anchor.is_none() {
            let found = filing_anchor(&extraction.events);
            if found.is_some() {
                extraction = self.timeline.extract_events(&document, found);
            }
        }
        let events_before = snapshot.events.len();
        self.timeline.merge_events(&mut snapshot.events, extraction.events);
        let events_added = snapshot.events.len() - events_before;
        annotations.extend(extraction.annotations);

        // Gap findings are a pure projection of the merged timeline.
        snapshot.gap_findings = self.timeline.detect_gaps(&request.case_id, &snapshot.events);

        // Actors.
        let mentions = extract_mentions(&document);
        self.registry
            .resolve(&request.case_id, &mut snapshot.actors, &document_id, mentions);
        self.registry
            .link_violations(&mut snapshot.actors, &snapshot.violations);

        // Contradictions. A failed check degrades to an annotation and is
        // retried on the next ingestion; it never fails the document.
        let contradictions_added =
            match self.check_contradictions(&request.case_id, &snapshot) {
                Ok(found) => {
                    let before = snapshot.contradictions.len();
                    self.contradiction.merge(&mut snapshot.contradictions, found);
                    snapshot.contradictions.len() - before
                }
                Err(error) => {
                    tracing::warn!(case_id = %request.case_id, %error, "contradiction check failed");
                    annotations.push(DocumentAnnotation {
                        document_id: document_id.clone(),
                        kind: AnnotationKind::ContradictionCheckFailed,
                        message: error.to_string(),
                    });
                    0
                }
            };

        snapshot.document_ids.push(document_id.clone());
        snapshot.documents.insert(document_id.clone(), document);
        snapshot.annotations.extend(annotations.iter().cloned());

        self.publish(&request.case_id, snapshot)?;

        tracing::info!(
            case_id = %request.case_id,
            document_id,
            violations_added,
            events_added,
            contradictions_added,
            "document ingested"
        );

        Ok(IngestOutcome {
            document_id,
            duplicate: false,
            violations_added,
            events_added,
            contradictions_added,
            annotations,
        })
    }

    /// Detect contradictions for the case, validating claim provenance
    /// before anything reaches the snapshot.
    fn check_contradictions(
        &self,
        case_id: &str,
        snapshot: &CaseSnapshot,
    ) -> Result<Vec<Contradiction>, EngineError> {
        let mut found = self.contradiction.detect_event_conflicts(case_id, &snapshot.events);
        found.extend(self.contradiction.detect_role_conflicts(case_id, &snapshot.actors));

        for contradiction in &found {
            for claim in &contradiction.claims {
                let known = snapshot.documents.contains_key(&claim.document_id)
                    || snapshot.events.iter().any(|e| e.document_id == claim.document_id);
                if !known {
                    return Err(EngineError::DataConsistency(format!(
                        "contradiction claim references unknown document {}",
                        claim.document_id
                    )));
                }
            }
        }
        Ok(found)
    }

    /// Validate and atomically publish a new snapshot, persisting it first
    /// when a store is attached.
    fn publish(&self, case_id: &str, snapshot: CaseSnapshot) -> Result<(), EngineError> {
        snapshot
            .check_consistency()
            .map_err(EngineError::DataConsistency)?;
        if let Some(store) = &self.store {
            store.save(&snapshot)?;
        }
        let mut published = self.published.write().map_err(|_| EngineError::LockPoisoned)?;
        published.insert(case_id.to_string(), Arc::new(snapshot));
        Ok(())
    }

    fn case_lock(&self, case_id: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self.ingest_locks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(case_id.to_string()).or_default()))
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn violations(
        &self,
        case_id: &str,
        filter: &ViolationFilter,
    ) -> Result<Vec<Violation>, EngineError> {
        let snapshot = self.snapshot(case_id)?;
        Ok(snapshot
            .violations
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect())
    }

    /// The case timeline in chronological order, dateless events last.
    pub fn timeline(&self, case_id: &str) -> Result<Vec<TimelineEvent>, EngineError> {
        Ok(self.snapshot(case_id)?.events.clone())
    }

    pub fn gap_findings(&self, case_id: &str) -> Result<Vec<GapFinding>, EngineError> {
        Ok(self.snapshot(case_id)?.gap_findings.clone())
    }

    /// Actors at or above `min_tier` with freshly derived risk, highest first.
    pub fn actors(&self, case_id: &str, min_tier: RiskTier) -> Result<Vec<ActorView>, EngineError> {
        let snapshot = self.snapshot(case_id)?;
        Ok(self
            .registry
            .views(&snapshot.actors, &snapshot.violations, min_tier))
    }

    pub fn contradictions(
        &self,
        case_id: &str,
        min_confidence: Option<f64>,
    ) -> Result<Vec<Contradiction>, EngineError> {
        let snapshot = self.snapshot(case_id)?;
        Ok(snapshot
            .contradictions
            .iter()
            .filter(|c| min_confidence.is_none_or(|m| c.confidence >= m))
            .cloned()
            .collect())
    }

    pub fn annotations(&self, case_id: &str) -> Result<Vec<DocumentAnnotation>, EngineError> {
        Ok(self.snapshot(case_id)?.annotations.clone())
    }

    pub fn search(
        &self,
        case_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, EngineError> {
        let snapshot = self.snapshot(case_id)?;
        Ok(self.search.search_case(&snapshot, query, limit))
    }

    pub fn similar_documents(
        &self,
        case_id: &str,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, EngineError> {
        let snapshot = self.snapshot(case_id)?;
        if !snapshot.documents.contains_key(document_id) {
            return Err(EngineError::DataConsistency(format!(
                "document {document_id} is not part of case {case_id}"
            )));
        }
        Ok(self.search.similar_documents(&snapshot, document_id, limit))
    }

    // ── Reviewer actions ───────────────────────────────────────────────

    /// Merge two actors a reviewer judged identical. Serialized with
    /// ingestion and published atomically like any other update.
    pub fn merge_actors(&self, case_id: &str, a: Uuid, b: Uuid) -> Result<Uuid, EngineError> {
        let case_lock = self.case_lock(case_id)?;
        let _guard = case_lock.lock().map_err(|_| EngineError::LockPoisoned)?;

        let mut snapshot = (*self.snapshot(case_id)?).clone();
        let kept = self.registry.merge(&mut snapshot.actors, a, b)?;
        self.publish(case_id, snapshot)?;
        Ok(kept)
    }

    /// Promote a gap finding into a procedural violation.
    pub fn promote_gap_finding(&self, case_id: &str, gap_id: Uuid) -> Result<Violation, EngineError> {
        let case_lock = self.case_lock(case_id)?;
        let _guard = case_lock.lock().map_err(|_| EngineError::LockPoisoned)?;

        let mut snapshot = (*self.snapshot(case_id)?).clone();
        let gap = snapshot
            .gap_findings
            .iter()
            .find(|g| g.id == gap_id)
            .ok_or_else(|| {
                EngineError::DataConsistency(format!("unknown gap finding {gap_id}"))
            })?;
        let violation = promote_gap(gap, &snapshot.events).ok_or_else(|| {
            EngineError::DataConsistency(format!(
                "gap finding {gap_id} references an event no longer on the timeline"
            ))
        })?;

        merge_violations(&mut snapshot.violations, vec![violation.clone()]);
        self.registry
            .link_violations(&mut snapshot.actors, &snapshot.violations);
        self.publish(case_id, snapshot)?;
        Ok(violation)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hex SHA-256 of the document text — the document's identity.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Merge violations by deterministic id: a re-detected violation supersedes
/// the stored one, new ids append. Returns how many ids were new. Output is
/// ordered by `(document_id, range, category)`.
fn merge_violations(existing: &mut Vec<Violation>, incoming: Vec<Violation>) -> usize {
    let mut by_id: std::collections::BTreeMap<Uuid, Violation> =
        existing.drain(..).map(|v| (v.id, v)).collect();
    let mut added = 0;
    for violation in incoming {
        if by_id.insert(violation.id, violation).is_none() {
            added += 1;
        }
    }
    let mut merged: Vec<Violation> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        (&a.document_id, a.char_range, a.category).cmp(&(&b.document_id, b.char_range, b.category))
    });
    *existing = merged;
    added
}

/// The case's anchor for relative date expressions: the earliest exactly
/// dated filing event, falling back to the earliest exact date of any kind.
fn filing_anchor(events: &[TimelineEvent]) -> Option<NaiveDate> {
    let exact = |e: &&TimelineEvent| e.precision == DatePrecision::Exact && e.date.is_some();
    events
        .iter()
        .filter(exact)
        .filter(|e| e.event_type == crate::models::enums::EventType::Filing)
        .filter_map(|e| e.date)
        .min()
        .or_else(|| events.iter().filter(exact).filter_map(|e| e.date).min())
}
