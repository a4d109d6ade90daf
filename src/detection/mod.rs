//! Violation Detection Engine.
//!
//! Two lanes run per document: the pattern lane (curated regex rules, exact
//! by construction) and the AI-assisted lane (bounded excerpts sent to the
//! reasoning service). Candidates are fused by overlap, then severity is
//! boosted for categories that recur within the document. Detection is
//! restartable: `detect` carries no per-document state, and an unavailable
//! AI lane degrades the result instead of failing it.

pub mod fusion;
pub mod patterns;

use std::sync::{Arc, Mutex};

use crate::config::{EngineConfig, MAX_SEVERITY};
use crate::models::enums::{DocumentKind, ViolationSource};
use crate::models::{CharRange, Document, Violation};
use crate::reasoning::{LaneState, ReasoningService, TaskDescriptor};

pub use fusion::{fuse, Candidate};

/// Context kept around a pattern match in the stored excerpt.
const EXCERPT_PAD: usize = 100;

/// Result of scanning one document.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub violations: Vec<Violation>,
    pub kind: DocumentKind,
    pub kind_confidence: f64,
    /// Reason the AI lane contributed nothing, when it didn't.
    pub ai_degraded: Option<String>,
}

pub struct DetectionEngine {
    config: Arc<EngineConfig>,
    reasoning: Option<Box<dyn ReasoningService>>,
    lane: Mutex<LaneState>,
}

impl DetectionEngine {
    pub fn new(config: Arc<EngineConfig>, reasoning: Option<Box<dyn ReasoningService>>) -> Self {
        let lane = LaneState::new(
            config.ai.enabled && reasoning.is_some(),
            config.ai.failure_threshold,
        );
        Self {
            config,
            reasoning,
            lane: Mutex::new(lane),
        }
    }

    /// Scan one document. Always returns at least the pattern-lane results.
    pub fn detect(&self, document: &Document) -> DetectionOutcome {
        let (kind, kind_confidence) = patterns::classify_kind(&document.text);
        let text_lower = document.text.to_lowercase();

        let mut candidates = self.pattern_lane(document, kind, &text_lower);
        let pattern_count = candidates.len();

        let ai_degraded = match self.ai_lane(document) {
            Ok(ai_candidates) => {
                candidates.extend(ai_candidates);
                None
            }
            Err(reason) => Some(reason),
        };

        let fused = fuse(candidates, self.config.fusion.overlap_threshold);
        let violations = self.score_and_build(document, fused);

        tracing::info!(
            document_id = %document.id,
            kind = kind.as_str(),
            pattern_candidates = pattern_count,
            violations = violations.len(),
            ai_degraded = ai_degraded.is_some(),
            "violation detection complete"
        );

        DetectionOutcome {
            violations,
            kind,
            kind_confidence,
            ai_degraded,
        }
    }

    // ── Pattern lane ───────────────────────────────────────────────────

    fn pattern_lane(
        &self,
        document: &Document,
        kind: DocumentKind,
        text_lower: &str,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for rule in patterns::RULE_LIBRARY.iter() {
            if !patterns::group_applies(rule.group, kind, text_lower) {
                continue;
            }
            for pattern in &rule.patterns {
                for m in pattern.find_iter(&document.text) {
                    let range = CharRange::new(m.start(), m.end());
                    candidates.push(Candidate {
                        category: rule.category,
                        rule: Some(rule.name.to_string()),
                        description: rule.description.to_string(),
                        severity: self.config.severity.weight(rule.category),
                        excerpt: context_excerpt(&document.text, range),
                        range,
                        source: ViolationSource::PatternMatch,
                        confidence: 1.0,
                    });
                }
            }
        }

        candidates
    }

    // ── AI-assisted lane ───────────────────────────────────────────────

    /// Run the AI lane, retrying a transient failure once. Returns a
    /// human-readable degradation reason instead of an error — the lane
    /// never fails an ingestion.
    fn ai_lane(&self, document: &Document) -> Result<Vec<Candidate>, String> {
        if !self.config.ai.enabled {
            return Err("AI lane disabled (development mode)".into());
        }
        let service = match &self.reasoning {
            Some(s) => s,
            None => return Err("AI lane disabled (no reasoning service configured)".into()),
        };
        {
            let lane = self.lane.lock().map_err(|_| "AI lane state unavailable".to_string())?;
            if !lane.available() {
                return Err("AI lane unavailable (circuit open)".into());
            }
        }

        let excerpt = bounded_excerpt(&document.text, self.config.ai.max_excerpt_chars);
        let task = TaskDescriptor::violation_classification();

        let judgment = match service.classify(excerpt, &task) {
            Ok(j) => j,
            Err(first) => {
                tracing::debug!(error = %first, "AI lane attempt failed, retrying once");
                match service.classify(excerpt, &task) {
                    Ok(j) => j,
                    Err(second) => {
                        if let Ok(mut lane) = self.lane.lock() {
                            lane.record_failure();
                        }
                        return Err(format!("AI lane unavailable: {second}"));
                    }
                }
            }
        };

        if let Ok(mut lane) = self.lane.lock() {
            lane.record_success();
        }

        Ok(self.map_findings(document, judgment))
    }

    fn map_findings(
        &self,
        document: &Document,
        judgment: crate::reasoning::ReasoningJudgment,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for finding in judgment.findings {
            let category = match crate::models::enums::ViolationCategory::parse(&finding.label) {
                Some(c) => c,
                None => {
                    tracing::debug!(label = %finding.label, "skipping finding with unknown category");
                    continue;
                }
            };

            // A finding must be anchored to a span of the document.
            let quote = match finding.quote.as_deref().filter(|q| !q.trim().is_empty()) {
                Some(q) => q,
                None => {
                    tracing::debug!(label = %finding.label, "skipping finding without a quote");
                    continue;
                }
            };
            let range = match find_ignore_case(&document.text, quote) {
                Some(range) => range,
                None => {
                    tracing::debug!(label = %finding.label, "quote not found in document, skipping");
                    continue;
                }
            };

            let confidence = finding
                .confidence
                .filter(|c| (0.0..=1.0).contains(c))
                .unwrap_or(self.config.ai.default_confidence);

            candidates.push(Candidate {
                category,
                rule: None,
                description: finding
                    .rationale
                    .unwrap_or_else(|| format!("{} issue reported by AI analysis", category.as_str())),
                severity: self.config.severity.weight(category),
                excerpt: context_excerpt(&document.text, range),
                range,
                source: ViolationSource::AiAssisted,
                confidence,
            });
        }

        candidates
    }

    // ── Scoring ────────────────────────────────────────────────────────

    /// Apply the repetition boost and mint final violations, ordered by
    /// `(range.start, range.end, category)`.
    fn score_and_build(&self, document: &Document, fused: Vec<Candidate>) -> Vec<Violation> {
        let mut category_counts: std::collections::BTreeMap<_, usize> = Default::default();
        for c in &fused {
            *category_counts.entry(c.category).or_default() += 1;
        }

        fused
            .into_iter()
            .map(|c| {
                let repeated = category_counts
                    .get(&c.category)
                    .is_some_and(|&n| n >= self.config.fusion.repetition_boost_threshold);
                let severity = if repeated {
                    (c.severity + 1).min(MAX_SEVERITY)
                } else {
                    c.severity
                };
                Violation {
                    id: Violation::deterministic_id(&document.id, c.range, c.category),
                    document_id: document.id.clone(),
                    category: c.category,
                    rule: c.rule,
                    description: c.description,
                    severity,
                    excerpt: c.excerpt,
                    char_range: c.range,
                    source: c.source,
                    confidence: c.confidence,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Case-insensitive substring search that returns byte offsets into the
/// ORIGINAL text. Searching a lowercased copy would not do: Unicode
/// lowercasing can change byte lengths and shift every offset after it.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<CharRange> {
    if needle.is_empty() {
        return None;
    }
    for (start, _) in haystack.char_indices() {
        let mut rest = haystack[start..].chars();
        let mut len = 0usize;
        let mut matched = true;
        for nc in needle.chars() {
            match rest.next() {
                Some(hc) if hc.to_lowercase().eq(nc.to_lowercase()) => len += hc.len_utf8(),
                _ => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            return Some(CharRange::new(start, start + len));
        }
    }
    None
}

/// Excerpt with context around the match, trimmed to char boundaries.
fn context_excerpt(text: &str, range: CharRange) -> String {
    let start = floor_char_boundary(text, range.start.saturating_sub(EXCERPT_PAD));
    let end = ceil_char_boundary(text, (range.end + EXCERPT_PAD).min(text.len()));
    text[start..end].trim().to_string()
}

/// First `max_chars` characters of the text, for the AI lane's context limit.
fn bounded_excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ViolationCategory;
    use crate::reasoning::{ReasoningError, ReasoningFinding, ReasoningJudgment};

    fn test_document(text: &str) -> Document {
        Document {
            id: "doc-1".into(),
            case_id: "case-1".into(),
            text: text.into(),
            page_offsets: Vec::new(),
            ingested_at: chrono::Utc::now(),
        }
    }

    fn pattern_only_engine() -> DetectionEngine {
        DetectionEngine::new(Arc::new(EngineConfig::default()), None)
    }

    /// Scripted reasoning service for tests.
    struct ScriptedService {
        responses: Mutex<Vec<Result<ReasoningJudgment, ReasoningError>>>,
    }

    impl ScriptedService {
        fn new(responses: Vec<Result<ReasoningJudgment, ReasoningError>>) -> Self {
            Self { responses: Mutex::new(responses) }
        }
    }

    impl crate::reasoning::ReasoningService for ScriptedService {
        fn classify(
            &self,
            _excerpt: &str,
            _task: &TaskDescriptor,
        ) -> Result<ReasoningJudgment, ReasoningError> {
            self.responses
                .lock()
                .unwrap()
                .remove(0)
        }
    }

    fn ai_engine(responses: Vec<Result<ReasoningJudgment, ReasoningError>>) -> DetectionEngine {
        let mut config = EngineConfig::default();
        config.ai.enabled = true;
        DetectionEngine::new(Arc::new(config), Some(Box::new(ScriptedService::new(responses))))
    }

    // ── Pattern lane ───────────────────────────────────────────────────

    #[test]
    fn rule_phrase_yields_pattern_violation() {
        let engine = pattern_only_engine();
        let doc = test_document("The respondent was denied right to counsel during the hearing.");
        let outcome = engine.detect(&doc);

        assert_eq!(outcome.violations.len(), 1);
        let v = &outcome.violations[0];
        assert_eq!(v.category, ViolationCategory::DueProcess);
        assert_eq!(v.source, ViolationSource::PatternMatch);
        assert_eq!(v.confidence, 1.0);
        assert_eq!(v.severity, 4);
        assert!(v.excerpt.contains("denied right to counsel"));
    }

    #[test]
    fn disabled_ai_degrades_to_pattern_only() {
        let engine = pattern_only_engine();
        let doc = test_document(
            "A procedural error occurred. The deadline missed was material. \
             Visitation denied to the mother by CPS without explanation.",
        );
        let outcome = engine.detect(&doc);

        assert_eq!(outcome.violations.len(), 3);
        assert!(outcome
            .violations
            .iter()
            .all(|v| v.source == ViolationSource::PatternMatch));
        assert!(outcome.ai_degraded.is_some());
    }

    #[test]
    fn cps_rules_skipped_without_cps_signal() {
        let engine = pattern_only_engine();
        // "visitation denied" is a CPS-group rule; no CPS signal here, but
        // "visitation" marks the document as a custody matter — the custody
        // group applies, the CPS group does not.
        let doc = test_document("Parenting time denied again at the family court session.");
        let outcome = engine.detect(&doc);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].category, ViolationCategory::Custody);
    }

    #[test]
    fn repetition_boosts_severity_one_tier() {
        let engine = pattern_only_engine();
        let doc = test_document(
            "First procedural error at intake. Later a filing error was logged. \
             Finally the deadline missed capped the record.",
        );
        let outcome = engine.detect(&doc);

        // Three distinct procedural violations — base weight 2, boosted to 3.
        assert_eq!(outcome.violations.len(), 3);
        assert!(outcome.violations.iter().all(|v| v.severity == 3));
    }

    #[test]
    fn detect_is_restartable() {
        let engine = pattern_only_engine();
        let doc = test_document("An ex parte proceeding was held on 01/05/2024.");
        let first = engine.detect(&doc);
        let second = engine.detect(&doc);
        assert_eq!(first.violations, second.violations);
    }

    // ── AI lane ────────────────────────────────────────────────────────

    fn finding(label: &str, quote: &str, confidence: Option<f64>) -> ReasoningFinding {
        ReasoningFinding {
            label: label.into(),
            quote: Some(quote.into()),
            confidence,
            rationale: None,
        }
    }

    #[test]
    fn ai_finding_fuses_with_pattern_match() {
        let text = "The respondent was denied right to counsel during the hearing.";
        let judgment = ReasoningJudgment {
            findings: vec![finding("due-process", "denied right to counsel", Some(0.8))],
        };
        let engine = ai_engine(vec![Ok(judgment)]);
        let outcome = engine.detect(&test_document(text));

        assert_eq!(outcome.violations.len(), 1);
        let v = &outcome.violations[0];
        assert_eq!(v.source, ViolationSource::Both);
        assert_eq!(v.confidence, 1.0, "max of pattern 1.0 and AI 0.8");
        assert!(outcome.ai_degraded.is_none());
    }

    #[test]
    fn ai_finding_without_pattern_keeps_ai_source() {
        let text = "The court ignored the mother's repeated objections entirely.";
        let judgment = ReasoningJudgment {
            findings: vec![finding("due-process", "ignored the mother's repeated objections", None)],
        };
        let engine = ai_engine(vec![Ok(judgment)]);
        let outcome = engine.detect(&test_document(text));

        assert_eq!(outcome.violations.len(), 1);
        let v = &outcome.violations[0];
        assert_eq!(v.source, ViolationSource::AiAssisted);
        assert_eq!(v.confidence, 0.5, "absent confidence defaults to 0.5");
    }

    #[test]
    fn ai_failure_retries_once_then_degrades() {
        let text = "A procedural error was noted.";
        let judgment = ReasoningJudgment {
            findings: vec![finding("procedural", "procedural error", Some(0.9))],
        };
        // First attempt fails, retry succeeds.
        let engine = ai_engine(vec![
            Err(ReasoningError::Timeout(60)),
            Ok(judgment),
        ]);
        let outcome = engine.detect(&test_document(text));
        assert!(outcome.ai_degraded.is_none());

        // Both attempts fail: degrade, pattern results survive.
        let engine = ai_engine(vec![
            Err(ReasoningError::Timeout(60)),
            Err(ReasoningError::Timeout(60)),
        ]);
        let outcome = engine.detect(&test_document(text));
        assert!(outcome.ai_degraded.is_some());
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].source, ViolationSource::PatternMatch);
    }

    #[test]
    fn unknown_label_and_unlocatable_quote_are_skipped() {
        let text = "Nothing patterned here, plain narrative text.";
        let judgment = ReasoningJudgment {
            findings: vec![
                finding("tort", "plain narrative", Some(0.9)),
                finding("procedural", "text that is not present", Some(0.9)),
            ],
        };
        let engine = ai_engine(vec![Ok(judgment)]);
        let outcome = engine.detect(&test_document(text));
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn quote_location_survives_multibyte_lowercasing() {
        // 'İ' (U+0130) lowercases to two code points and grows by one byte;
        // offsets found in a lowercased copy would drift on everything after
        // it. The stored range must slice the original text exactly.
        let text = "The İstanbul Report was IGNORED BY THE COURT entirely.";
        let judgment = ReasoningJudgment {
            findings: vec![finding("due-process", "ignored by the court", Some(0.9))],
        };
        let engine = ai_engine(vec![Ok(judgment)]);
        let doc = test_document(text);
        let outcome = engine.detect(&doc);

        assert_eq!(outcome.violations.len(), 1);
        let r = outcome.violations[0].char_range;
        assert_eq!(&doc.text[r.start..r.end], "IGNORED BY THE COURT");
    }

    #[test]
    fn disabled_lane_with_service_reports_disabled_not_circuit_open() {
        // enabled = false with a service wired in: development mode, and the
        // service must never be contacted (an empty script would panic).
        let config = EngineConfig::default();
        assert!(!config.ai.enabled);
        let engine = DetectionEngine::new(
            Arc::new(config),
            Some(Box::new(ScriptedService::new(Vec::new()))),
        );

        let outcome = engine.detect(&test_document("plain text"));
        let reason = outcome.ai_degraded.unwrap();
        assert!(reason.contains("disabled"));
        assert!(!reason.contains("circuit open"));
    }

    #[test]
    fn circuit_opens_after_repeated_failures() {
        let mut config = EngineConfig::default();
        config.ai.enabled = true;
        config.ai.failure_threshold = 1;
        let engine = DetectionEngine::new(
            Arc::new(config),
            Some(Box::new(ScriptedService::new(vec![
                Err(ReasoningError::Timeout(60)),
                Err(ReasoningError::Timeout(60)),
            ]))),
        );

        let doc = test_document("plain text");
        let first = engine.detect(&doc);
        assert!(first.ai_degraded.unwrap().contains("unavailable"));

        // Breaker is open now; no scripted responses remain, and none are
        // consumed because the lane is skipped outright.
        let second = engine.detect(&doc);
        assert!(second.ai_degraded.unwrap().contains("circuit open"));
    }
}
