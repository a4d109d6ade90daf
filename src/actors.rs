//! Actor Registry: mention extraction, identity resolution across documents,
//! explicit merges, and derived risk scoring.
//!
//! Resolution is conservative. A mention resolves to an existing actor only
//! when the roles agree and the normalized names match within the configured
//! edit distance; anything else becomes a new actor, and a human decides
//! doubtful cases through `merge`. Risk is never stored — it is recomputed
//! from linked violations on every read.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::enums::{ActorRole, RiskTier};
use crate::models::{Actor, ActorView, CharRange, Document, MentionRef, Violation};
use crate::normalize::{names_match, normalize_name};

// ---------------------------------------------------------------------------
// Mention extraction
// ---------------------------------------------------------------------------

/// One raw actor mention found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub raw_name: String,
    pub role: ActorRole,
    pub range: CharRange,
}

// Capitalized name of one to three tokens; the role word stays
// case-insensitive while the name must be capitalized.
const NAME: &str = r"([A-Z][a-z'-]+(?:\s+[A-Z][a-z'-]+){0,2})";

struct MentionRule {
    role: ActorRole,
    pattern: Regex,
}

static MENTION_RULES: LazyLock<Vec<MentionRule>> = LazyLock::new(|| {
    let rule = |role, pattern: String| MentionRule {
        role,
        pattern: Regex::new(&pattern).expect("mention regex is valid"),
    };
    vec![
        rule(ActorRole::Judge, format!(r"(?:(?i:judge|justice|honorable)|Hon\.)\s+{NAME}")),
        rule(ActorRole::Attorney, format!(r"(?i:attorney|counsel)\s+{NAME}")),
        rule(ActorRole::Attorney, format!(r"{NAME},?\s+Esq\.?")),
        rule(ActorRole::Caseworker, format!(r"(?i:caseworker|case\s+worker|social\s+worker)\s+{NAME}")),
        rule(ActorRole::Parent, format!(r"(?i:the\s+)?(?i:mother|father|parent),?\s+{NAME}")),
        rule(ActorRole::Parent, format!(r"{NAME},\s+the\s+(?i:mother|father)")),
    ]
});

/// Scan a document for role-tagged name mentions. Output order follows
/// rule-table order, then match position, so extraction is deterministic.
pub fn extract_mentions(document: &Document) -> Vec<Mention> {
    let mut mentions = Vec::new();
    for rule in MENTION_RULES.iter() {
        for caps in rule.pattern.captures_iter(&document.text) {
            let whole = caps.get(0).map(|m| CharRange::new(m.start(), m.end()));
            let name = caps.get(1).map(|m| m.as_str().trim().to_string());
            if let (Some(range), Some(raw_name)) = (whole, name) {
                mentions.push(Mention { raw_name, role: rule.role, range });
            }
        }
    }
    mentions
}

// ---------------------------------------------------------------------------
// ActorRegistry
// ---------------------------------------------------------------------------

pub struct ActorRegistry {
    config: Arc<EngineConfig>,
}

impl ActorRegistry {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Resolve one document's mentions into the case's actor map. Mentions
    /// matching an existing actor (same role, names within tolerance) attach
    /// to it; the rest create new actors with deterministic identities.
    pub fn resolve(
        &self,
        case_id: &str,
        actors: &mut BTreeMap<Uuid, Actor>,
        document_id: &str,
        mentions: Vec<Mention>,
    ) {
        for mention in mentions {
            let normalized = normalize_name(&mention.raw_name);
            if normalized.is_empty() {
                continue;
            }
            let mention_ref = MentionRef {
                document_id: document_id.to_string(),
                char_range: mention.range,
            };

            let existing_id = actors
                .values()
                .find(|a| {
                    a.role == mention.role
                        && names_match(&a.normalized_name, &normalized, &self.config.resolution)
                })
                .map(|a| a.id);

            let id = existing_id.unwrap_or_else(|| Actor::identity(case_id, &normalized, mention.role));
            let actor = actors.entry(id).or_insert_with(|| Actor {
                id,
                display_name: mention.raw_name.clone(),
                normalized_name: normalized,
                role: mention.role,
                mention_refs: Default::default(),
                violation_refs: Default::default(),
            });
            actor.mention_refs.insert(mention_ref);
        }
    }

    /// Attach violations to every actor mentioned in the same document.
    pub fn link_violations(&self, actors: &mut BTreeMap<Uuid, Actor>, violations: &[Violation]) {
        for actor in actors.values_mut() {
            for violation in violations {
                if actor
                    .mention_refs
                    .iter()
                    .any(|m| m.document_id == violation.document_id)
                {
                    actor.violation_refs.insert(violation.id);
                }
            }
        }
    }

    /// Merge two actors that a reviewer has judged to be the same person.
    /// The surviving record keeps the lexicographically smaller id, so
    /// `merge(a, b)` and `merge(b, a)` produce identical state; merging an
    /// actor into itself is a no-op.
    pub fn merge(
        &self,
        actors: &mut BTreeMap<Uuid, Actor>,
        a: Uuid,
        b: Uuid,
    ) -> Result<Uuid, EngineError> {
        if a == b {
            return if actors.contains_key(&a) {
                Ok(a)
            } else {
                Err(EngineError::DataConsistency(format!("unknown actor {a}")))
            };
        }
        let (keep_id, drop_id) = (a.min(b), a.max(b));
        if !actors.contains_key(&keep_id) || !actors.contains_key(&drop_id) {
            return Err(EngineError::DataConsistency(format!(
                "merge requires both actors to exist ({a}, {b})"
            )));
        }

        let dropped = actors.remove(&drop_id).ok_or_else(|| {
            EngineError::DataConsistency(format!("unknown actor {drop_id}"))
        })?;
        let kept = actors.get_mut(&keep_id).ok_or_else(|| {
            EngineError::DataConsistency(format!("unknown actor {keep_id}"))
        })?;

        kept.mention_refs.extend(dropped.mention_refs);
        kept.violation_refs.extend(dropped.violation_refs);
        // The longer display name usually carries more of the full name.
        if dropped.display_name.len() > kept.display_name.len() {
            kept.display_name = dropped.display_name;
        }

        tracing::info!(kept = %keep_id, dropped = %drop_id, "merged actors");
        Ok(keep_id)
    }

    /// Derived risk for one actor: raw exposure is the sum of linked
    /// violation severities, normalized through `raw / (raw + saturation)`.
    /// Monotone in severity sum and bounded below 1.0.
    pub fn risk_view(&self, actor: &Actor, violations: &[Violation]) -> ActorView {
        let raw: u64 = violations
            .iter()
            .filter(|v| actor.violation_refs.contains(&v.id))
            .map(|v| u64::from(v.severity))
            .sum();

        let score = raw as f64 / (raw as f64 + self.config.risk.saturation);
        let tier = self.tier(score);

        ActorView {
            actor: actor.clone(),
            risk_score: score,
            risk_tier: tier,
        }
    }

    fn tier(&self, score: f64) -> RiskTier {
        let r = &self.config.risk;
        if score >= r.critical_threshold {
            RiskTier::Critical
        } else if score >= r.high_threshold {
            RiskTier::High
        } else if score >= r.medium_threshold {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// All actors at or above `min_tier`, highest risk first. Ties order by
    /// actor id so the listing is stable.
    pub fn views(
        &self,
        actors: &BTreeMap<Uuid, Actor>,
        violations: &[Violation],
        min_tier: RiskTier,
    ) -> Vec<ActorView> {
        let mut views: Vec<ActorView> = actors
            .values()
            .map(|a| self.risk_view(a, violations))
            .filter(|v| v.risk_tier >= min_tier)
            .collect();
        views.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.actor.id.cmp(&b.actor.id))
        });
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{ViolationCategory, ViolationSource};
    use chrono::Utc;

    fn registry() -> ActorRegistry {
        ActorRegistry::new(Arc::new(EngineConfig::default()))
    }

    fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.into(),
            case_id: "case-1".into(),
            text: text.into(),
            page_offsets: Vec::new(),
            ingested_at: Utc::now(),
        }
    }

    fn violation(id_seed: &str, document_id: &str, severity: u8) -> Violation {
        Violation {
            id: Uuid::new_v5(&crate::models::CASELENS_NAMESPACE, id_seed.as_bytes()),
            document_id: document_id.into(),
            category: ViolationCategory::Procedural,
            rule: None,
            description: "test".into(),
            severity,
            excerpt: "…".into(),
            char_range: CharRange::new(0, 10),
            source: ViolationSource::PatternMatch,
            confidence: 1.0,
        }
    }

    // ── Extraction ─────────────────────────────────────────────────────

    #[test]
    fn extracts_role_tagged_mentions() {
        let mentions = extract_mentions(&doc(
            "d1",
            "Judge William Smith presided. Caseworker Mary Jones testified. \
             The mother, Jane Doe, objected.",
        ));

        assert!(mentions
            .iter()
            .any(|m| m.raw_name == "William Smith" && m.role == ActorRole::Judge));
        assert!(mentions
            .iter()
            .any(|m| m.raw_name == "Mary Jones" && m.role == ActorRole::Caseworker));
        assert!(mentions
            .iter()
            .any(|m| m.raw_name == "Jane Doe" && m.role == ActorRole::Parent));
    }

    #[test]
    fn honorable_and_esq_forms_are_recognized() {
        let mentions = extract_mentions(&doc(
            "d1",
            "The Honorable Sarah Brown heard argument from Robert Lee, Esq.",
        ));
        assert!(mentions
            .iter()
            .any(|m| m.raw_name == "Sarah Brown" && m.role == ActorRole::Judge));
        assert!(mentions
            .iter()
            .any(|m| m.raw_name == "Robert Lee" && m.role == ActorRole::Attorney));
    }

    // ── Resolution ─────────────────────────────────────────────────────

    #[test]
    fn same_person_across_documents_resolves_once() {
        let reg = registry();
        let mut actors = BTreeMap::new();

        let d1 = doc("d1", "Judge William Smith presided.");
        let d2 = doc("d2", "JUDGE WILLIAM SMITH continued the matter.");
        // Capitalized-name capture misses the all-caps form; mention it the
        // usual way in a third document with a near-miss spelling.
        let d3 = doc("d3", "Judge William Smyth entered the order.");

        reg.resolve("case-1", &mut actors, "d1", extract_mentions(&d1));
        reg.resolve("case-1", &mut actors, "d2", extract_mentions(&d2));
        reg.resolve("case-1", &mut actors, "d3", extract_mentions(&d3));

        assert_eq!(actors.len(), 1, "fuzzy match folds Smyth into Smith");
        let actor = actors.values().next().unwrap();
        assert_eq!(actor.normalized_name, "william smith");
        assert_eq!(actor.mention_refs.len(), 2);
    }

    #[test]
    fn same_name_different_role_stays_distinct() {
        let reg = registry();
        let mut actors = BTreeMap::new();
        let d = doc("d1", "Judge Jordan Casey recused. Caseworker Jordan Casey testified.");
        reg.resolve("case-1", &mut actors, "d1", extract_mentions(&d));
        assert_eq!(actors.len(), 2);
    }

    #[test]
    fn resolution_is_idempotent() {
        let reg = registry();
        let mut actors = BTreeMap::new();
        let d = doc("d1", "Judge William Smith presided.");

        reg.resolve("case-1", &mut actors, "d1", extract_mentions(&d));
        let first = actors.clone();
        reg.resolve("case-1", &mut actors, "d1", extract_mentions(&d));
        assert_eq!(actors, first);
    }

    // ── Merge ──────────────────────────────────────────────────────────

    fn two_actor_map(reg: &ActorRegistry) -> BTreeMap<Uuid, Actor> {
        let mut actors = BTreeMap::new();
        reg.resolve(
            "case-1",
            &mut actors,
            "d1",
            extract_mentions(&doc("d1", "Judge Bill Harrington presided.")),
        );
        reg.resolve(
            "case-1",
            &mut actors,
            "d2",
            extract_mentions(&doc("d2", "Judge William Harrington continued the matter.")),
        );
        actors
    }

    #[test]
    fn merge_is_order_independent() {
        let reg = registry();
        let actors = two_actor_map(&reg);
        assert_eq!(actors.len(), 2, "Bill vs William exceeds the edit tolerance");
        let ids: Vec<Uuid> = actors.keys().copied().collect();

        let mut left = actors.clone();
        let mut right = actors.clone();
        let kept_left = reg.merge(&mut left, ids[0], ids[1]).unwrap();
        let kept_right = reg.merge(&mut right, ids[1], ids[0]).unwrap();

        assert_eq!(kept_left, kept_right);
        assert_eq!(left, right);
        assert_eq!(left.len(), 1);
        assert_eq!(left[&kept_left].mention_refs.len(), 2);
    }

    #[test]
    fn merge_is_idempotent_after_first_apply() {
        let reg = registry();
        let mut actors = two_actor_map(&reg);
        let ids: Vec<Uuid> = actors.keys().copied().collect();

        let kept = reg.merge(&mut actors, ids[0], ids[1]).unwrap();
        let after_first = actors.clone();
        // Self-merge of the survivor changes nothing.
        assert_eq!(reg.merge(&mut actors, kept, kept).unwrap(), kept);
        assert_eq!(actors, after_first);
        // Re-merging the dropped actor is an error, not silent corruption.
        assert!(reg.merge(&mut actors, ids[0], ids[1]).is_err());
    }

    // ── Risk ───────────────────────────────────────────────────────────

    #[test]
    fn risk_is_monotone_and_saturating() {
        let reg = registry();
        let mut actors = BTreeMap::new();
        reg.resolve(
            "case-1",
            &mut actors,
            "d1",
            extract_mentions(&doc("d1", "Caseworker Mary Jones testified.")),
        );

        let mut violations = Vec::new();
        let mut last_score = 0.0;
        for i in 0..10 {
            violations.push(violation(&format!("v{i}"), "d1", 4));
            reg.link_violations(&mut actors, &violations);
            let view = reg.risk_view(actors.values().next().unwrap(), &violations);
            assert!(view.risk_score > last_score, "each violation raises the score");
            assert!(view.risk_score < 1.0, "score never reaches 1.0");
            last_score = view.risk_score;
        }
    }

    #[test]
    fn risk_tiers_follow_thresholds() {
        let reg = registry();
        let mut actors = BTreeMap::new();
        reg.resolve(
            "case-1",
            &mut actors,
            "d1",
            extract_mentions(&doc("d1", "Caseworker Mary Jones testified.")),
        );

        // No violations: raw 0 → score 0 → Low.
        let actor = actors.values().next().unwrap().clone();
        assert_eq!(reg.risk_view(&actor, &[]).risk_tier, RiskTier::Low);

        // One severity-5: raw 5 → 5/17 ≈ 0.29 → Medium.
        let violations = vec![violation("v0", "d1", 5)];
        reg.link_violations(&mut actors, &violations);
        let actor = actors.values().next().unwrap();
        assert_eq!(reg.risk_view(actor, &violations).risk_tier, RiskTier::Medium);

        // Eight severity-5: raw 40 → 40/52 ≈ 0.77 → Critical.
        let violations: Vec<Violation> =
            (0..8).map(|i| violation(&format!("v{i}"), "d1", 5)).collect();
        let mut actors2 = actors.clone();
        reg.link_violations(&mut actors2, &violations);
        let actor = actors2.values().next().unwrap();
        assert_eq!(reg.risk_view(actor, &violations).risk_tier, RiskTier::Critical);
    }

    #[test]
    fn views_filter_by_min_tier_and_sort_by_score() {
        let reg = registry();
        let mut actors = BTreeMap::new();
        reg.resolve(
            "case-1",
            &mut actors,
            "d1",
            extract_mentions(&doc("d1", "Judge Ann Hall presided. Caseworker Mary Jones testified.")),
        );
        reg.resolve(
            "case-1",
            &mut actors,
            "d2",
            extract_mentions(&doc("d2", "Caseworker Mary Jones filed the report.")),
        );

        // Violations only in d2 — only the caseworker accrues risk.
        let violations = vec![violation("v0", "d2", 5), violation("v1", "d2", 5)];
        reg.link_violations(&mut actors, &violations);

        let all = reg.views(&actors, &violations, RiskTier::Low);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].actor.role, ActorRole::Caseworker);
        assert!(all[0].risk_score > all[1].risk_score);

        let risky = reg.views(&actors, &violations, RiskTier::Medium);
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].actor.role, ActorRole::Caseworker);
    }
}
