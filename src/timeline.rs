//! Timeline Engine: date extraction, chronological ordering, and gap
//! detection against the statutory deadline table.
//!
//! Extraction never guesses: an unparseable or ambiguous date expression
//! yields a dateless event plus a visible `DateSkipped` annotation, and
//! relative expressions resolve only against an explicit anchor date.
//! Gap findings are annotations, not violations — `promote_gap` converts
//! one explicitly when the caller wants it scored.

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::enums::{AnnotationKind, DatePrecision, EventType, ViolationCategory, ViolationSource};
use crate::models::{
    case_namespace, CharRange, Document, DocumentAnnotation, GapFinding, TimelineEvent, Violation,
};
use crate::normalize::parse_date_expr;

// ---------------------------------------------------------------------------
// Date expression scanning
// ---------------------------------------------------------------------------

static RE_NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("numeric date regex is valid")
});

static RE_ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date regex is valid")
});

static RE_SPELLED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.?\s+\d{1,2},?\s+\d{4}\b",
    )
    .expect("spelled date regex is valid")
});

static RE_RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{1,3}|[a-z]+(?:-[a-z]+)?)\s+(?:days?|weeks?)\s+(?:after|following)\s+(?:the\s+)?(?:filing|petition|removal)\b",
    )
    .expect("relative date regex is valid")
});

/// Context keywords deciding an event's type, checked in priority order.
/// The first group with a hit wins; a dated sentence with no signal at all
/// defaults to `Filing`, the least specific court event.
const EVENT_SIGNALS: &[(EventType, &[&str])] = &[
    (EventType::Incident, &["removal", "removed", "taken into custody", "incident", "allegation"]),
    (EventType::Hearing, &["hearing", "trial", "appeared", "appearance", "adjudication"]),
    (EventType::Order, &["order", "ordered", "decree", "judgment", "ruled", "ruling"]),
    (EventType::Deadline, &["deadline", "due by", "no later than", "must be completed"]),
    (EventType::Filing, &["filed", "filing", "petition", "motion", "submitted"]),
];

fn classify_event(context_lower: &str) -> EventType {
    for (event_type, signals) in EVENT_SIGNALS {
        if signals.iter().any(|s| context_lower.contains(s)) {
            return *event_type;
        }
    }
    EventType::Filing
}

/// The sentence (or line) containing a match, used as the event description
/// and as the typing context.
fn containing_sentence(text: &str, range: CharRange) -> (usize, usize) {
    let boundary = |c: char| c == '.' || c == '\n' || c == ';';
    let start = text[..range.start]
        .char_indices()
        .rev()
        .find(|(_, c)| boundary(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let end = text[range.end..]
        .char_indices()
        .find(|(_, c)| boundary(*c))
        .map(|(i, _)| range.end + i)
        .unwrap_or(text.len());
    (start, end)
}

fn event_id(case_id: &str, document_id: &str, range: CharRange) -> Uuid {
    let ns = case_namespace(case_id);
    let key = format!("event:{document_id}:{}:{}", range.start, range.end);
    Uuid::new_v5(&ns, key.as_bytes())
}

// ---------------------------------------------------------------------------
// TimelineEngine
// ---------------------------------------------------------------------------

pub struct TimelineEngine {
    config: Arc<EngineConfig>,
}

/// Events and skipped-date annotations from one document.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub events: Vec<TimelineEvent>,
    pub annotations: Vec<DocumentAnnotation>,
}

impl TimelineEngine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Scan one document for date expressions and turn each into an event.
    /// `anchor` resolves relative expressions; without one they stay dateless.
    pub fn extract_events(
        &self,
        document: &Document,
        anchor: Option<NaiveDate>,
    ) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        let mut seen: std::collections::BTreeSet<CharRange> = Default::default();

        let scanners = [&*RE_ISO_DATE, &*RE_NUMERIC_DATE, &*RE_SPELLED_DATE, &*RE_RELATIVE_DATE];
        for scanner in scanners {
            for m in scanner.find_iter(&document.text) {
                let range = CharRange::new(m.start(), m.end());
                // ISO dates also match the numeric scanner; first hit wins.
                if seen.iter().any(|r| r.overlap_len(&range) > 0) {
                    continue;
                }
                seen.insert(range);

                let raw = m.as_str().to_string();
                let (sent_start, sent_end) = containing_sentence(&document.text, range);
                let description = document.text[sent_start..sent_end].trim().to_string();
                let context_lower = description.to_lowercase();

                let (date, precision) = match parse_date_expr(&raw, anchor) {
                    Some((date, precision)) => (Some(date), precision),
                    None => {
                        outcome.annotations.push(DocumentAnnotation {
                            document_id: document.id.clone(),
                            kind: AnnotationKind::DateSkipped,
                            message: format!("date expression '{raw}' could not be resolved"),
                        });
                        (None, DatePrecision::Relative)
                    }
                };

                outcome.events.push(TimelineEvent {
                    id: event_id(&document.case_id, &document.id, range),
                    case_id: document.case_id.clone(),
                    date,
                    precision,
                    raw_date: raw,
                    description,
                    document_id: document.id.clone(),
                    char_range: range,
                    event_type: classify_event(&context_lower),
                });
            }
        }

        tracing::debug!(
            document_id = %document.id,
            events = outcome.events.len(),
            skipped = outcome.annotations.len(),
            "timeline extraction complete"
        );
        outcome
    }

    /// Merge newly extracted events into a case timeline. Idempotent: an
    /// event already present (same document and range) is not duplicated.
    /// The result is sorted chronologically, dateless events last.
    pub fn merge_events(&self, existing: &mut Vec<TimelineEvent>, incoming: Vec<TimelineEvent>) {
        let known: std::collections::BTreeSet<_> =
            existing.iter().map(TimelineEvent::dedupe_key).collect();
        existing.extend(
            incoming
                .into_iter()
                .filter(|e| !known.contains(&e.dedupe_key())),
        );
        existing.sort_by_key(TimelineEvent::ordering_key);
    }

    /// Check the ordered timeline against the deadline table and the
    /// consecutive-delay bound. Pure over its input; calling it twice on the
    /// same timeline yields the same findings.
    pub fn detect_gaps(&self, case_id: &str, events: &[TimelineEvent]) -> Vec<GapFinding> {
        let mut findings = Vec::new();
        let mut dated: Vec<&TimelineEvent> = events.iter().filter(|e| e.date.is_some()).collect();
        dated.sort_by_key(|e| e.date);

        for rule in &self.config.timeline.deadlines {
            let triggers: Vec<&TimelineEvent> = dated
                .iter()
                .copied()
                .filter(|e| e.event_type == rule.from_type)
                .collect();

            // Each trigger is checked against its own chain: the earliest
            // qualifying event between it and the next trigger of the same
            // type. No qualifying event at all means the deadline event
            // simply hasn't been documented yet.
            for (i, from) in triggers.iter().enumerate() {
                let from_date = from.date.unwrap_or_default();
                let next_trigger = triggers.get(i + 1).and_then(|e| e.date);
                let to = dated
                    .iter()
                    .copied()
                    .filter(|e| e.event_type == rule.to_type)
                    .filter(|e| e.date.unwrap_or_default() >= from_date)
                    .filter(|e| next_trigger.is_none_or(|n| e.date.unwrap_or_default() < n))
                    .min_by_key(|e| e.date);
                let Some(to) = to else { continue };

                let elapsed = (to.date.unwrap_or_default() - from_date).num_days();
                if elapsed > rule.max_days {
                    findings.push(self.gap(
                        case_id,
                        from,
                        to,
                        elapsed,
                        rule.max_days,
                        &rule.description,
                        rule.severity,
                    ));
                }
            }
        }

        if let Some(limit) = self.config.timeline.consecutive_delay_days {
            for pair in dated.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let elapsed = (b.date.unwrap_or_default() - a.date.unwrap_or_default()).num_days();
                if elapsed > limit {
                    let description =
                        format!("{elapsed} days elapsed between consecutive case events");
                    findings.push(self.gap(case_id, a, b, elapsed, limit, &description, 2));
                }
            }
        }

        findings
    }

    fn gap(
        &self,
        case_id: &str,
        from: &TimelineEvent,
        to: &TimelineEvent,
        elapsed_days: i64,
        max_days: i64,
        description: &str,
        severity: u8,
    ) -> GapFinding {
        let ns = case_namespace(case_id);
        let key = format!("gap:{}:{}:{max_days}", from.id, to.id);
        GapFinding {
            id: Uuid::new_v5(&ns, key.as_bytes()),
            case_id: case_id.to_string(),
            from_event_id: from.id,
            to_event_id: to.id,
            from_type: from.event_type,
            to_type: to.event_type,
            elapsed_days,
            max_days,
            description: description.to_string(),
            severity,
        }
    }
}

/// Promote a gap finding to a procedural violation, anchored to the event
/// that missed the deadline. Returns `None` when the timeline no longer
/// contains that event.
pub fn promote_gap(gap: &GapFinding, events: &[TimelineEvent]) -> Option<Violation> {
    let to_event = events.iter().find(|e| e.id == gap.to_event_id)?;
    Some(Violation {
        id: Violation::deterministic_id(
            &to_event.document_id,
            to_event.char_range,
            ViolationCategory::Procedural,
        ),
        document_id: to_event.document_id.clone(),
        category: ViolationCategory::Procedural,
        rule: Some("timeline_gap".into()),
        description: format!(
            "{} ({} days elapsed, limit {})",
            gap.description, gap.elapsed_days, gap.max_days
        ),
        severity: gap.severity,
        excerpt: to_event.description.clone(),
        char_range: to_event.char_range,
        source: ViolationSource::PatternMatch,
        confidence: 1.0,
    })
}
