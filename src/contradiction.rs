//! Contradiction Detector: finds factual inconsistencies between documents.
//!
//! Claims are distilled from already-normalized material (timeline events,
//! resolved actors) rather than raw text, so two phrasings of the same fact
//! compare equal unless their substance differs. Detection is symmetric —
//! claims are sorted before a contradiction is minted — and append-only:
//! re-running detection never duplicates a finding.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::enums::{ActorRole, DatePrecision, SubjectType};
use crate::models::{Actor, Claim, Contradiction, TimelineEvent};

/// Confidence contributed by one claim, by how precisely its date was stated.
fn precision_weight(precision: DatePrecision) -> f64 {
    match precision {
        DatePrecision::Exact => 0.95,
        DatePrecision::Relative => 0.6,
    }
}

/// Subject stems that anchor an event claim. An event whose description
/// carries none of these is too vague to compare across documents.
static SUBJECT_STEMS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let stem = |pattern: &str, canonical| {
        (Regex::new(&format!("(?i){pattern}")).expect("stem regex is valid"), canonical)
    };
    vec![
        stem(r"remov(?:al|ed)", "removal"),
        stem(r"placement|placed", "placement"),
        stem(r"visitation|parenting\s+time", "visitation"),
        stem(r"hearing|trial", "hearing"),
        stem(r"petition|filed|filing", "filing"),
        stem(r"order(?:ed)?|decree|judgment", "order"),
    ]
});

fn subject_stem(description: &str) -> Option<&'static str> {
    SUBJECT_STEMS
        .iter()
        .find(|(re, _)| re.is_match(description))
        .map(|(_, canonical)| *canonical)
}

pub struct ContradictionDetector {
    #[allow(dead_code)]
    config: Arc<EngineConfig>,
}

impl ContradictionDetector {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Compare event-date claims across the case's documents. Two documents
    /// asserting different dates for the same subject (e.g. the removal)
    /// yield exactly one contradiction carrying both claims.
    pub fn detect_event_conflicts(
        &self,
        case_id: &str,
        events: &[TimelineEvent],
    ) -> Vec<Contradiction> {
        // signature -> (claim, precision) list
        let mut groups: BTreeMap<String, Vec<(Claim, DatePrecision)>> = BTreeMap::new();

        for event in events {
            let Some(date) = event.date else { continue };
            let Some(stem) = subject_stem(&event.description) else { continue };
            let signature = format!("{}:{stem}", event.event_type.as_str());
            groups.entry(signature).or_default().push((
                Claim {
                    document_id: event.document_id.clone(),
                    char_range: event.char_range,
                    normalized_value: date.format("%Y-%m-%d").to_string(),
                },
                event.precision,
            ));
        }

        let mut contradictions = Vec::new();
        for (signature, mut group) in groups {
            group.sort_by(|a, b| a.0.cmp(&b.0));
            group.dedup_by(|a, b| a.0 == b.0);

            let distinct_values: std::collections::BTreeSet<&str> =
                group.iter().map(|(c, _)| c.normalized_value.as_str()).collect();
            let distinct_documents: std::collections::BTreeSet<&str> =
                group.iter().map(|(c, _)| c.document_id.as_str()).collect();
            if distinct_values.len() < 2 || distinct_documents.len() < 2 {
                continue;
            }

            // Product of the two least precise claims in the group.
            let mut weights: Vec<f64> =
                group.iter().map(|(_, p)| precision_weight(*p)).collect();
            weights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let confidence = weights[0] * weights.get(1).copied().unwrap_or(1.0);

            let values = distinct_values.into_iter().collect::<Vec<_>>().join(" vs ");
            let claims: Vec<Claim> = group.into_iter().map(|(c, _)| c).collect();
            contradictions.push(Contradiction {
                id: Contradiction::deterministic_id(case_id, &signature, "date", &claims),
                case_id: case_id.to_string(),
                subject_type: SubjectType::Event,
                subject_key: signature.clone(),
                field_key: "date".into(),
                claims,
                confidence,
                description: format!("documents disagree on the {signature} date: {values}"),
            });
        }

        contradictions
    }

    /// Flag the same name carrying different roles in different documents.
    /// Often legitimate (a parent may also be a caseworker elsewhere), so
    /// these carry low confidence and exist for reviewer attention.
    pub fn detect_role_conflicts(
        &self,
        case_id: &str,
        actors: &BTreeMap<Uuid, Actor>,
    ) -> Vec<Contradiction> {
        let mut by_name: BTreeMap<&str, Vec<&Actor>> = BTreeMap::new();
        for actor in actors.values() {
            by_name.entry(actor.normalized_name.as_str()).or_default().push(actor);
        }

        let mut contradictions = Vec::new();
        for (name, group) in by_name {
            let roles: std::collections::BTreeSet<ActorRole> =
                group.iter().map(|a| a.role).collect();
            if roles.len() < 2 {
                continue;
            }
            let mut claims: Vec<Claim> = group
                .iter()
                .flat_map(|a| {
                    a.mention_refs.iter().map(|m| Claim {
                        document_id: m.document_id.clone(),
                        char_range: m.char_range,
                        normalized_value: a.role.as_str().to_string(),
                    })
                })
                .collect();
            claims.sort();
            let distinct_documents: std::collections::BTreeSet<&str> =
                claims.iter().map(|c| c.document_id.as_str()).collect();
            if distinct_documents.len() < 2 {
                continue;
            }

            let roles = roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(" vs ");
            contradictions.push(Contradiction {
                id: Contradiction::deterministic_id(case_id, name, "role", &claims),
                case_id: case_id.to_string(),
                subject_type: SubjectType::Actor,
                subject_key: name.to_string(),
                field_key: "role".into(),
                claims,
                confidence: 0.5,
                description: format!("'{name}' appears under conflicting roles: {roles}"),
            });
        }

        contradictions
    }

    /// Fold newly detected contradictions into the stored set. A finding
    /// whose claim set strictly grew (a third document joined an existing
    /// conflict) supersedes the stale narrower one for the same subject and
    /// field; genuinely new subjects append, and re-detections of an
    /// unchanged conflict are skipped by id.
    pub fn merge(&self, existing: &mut Vec<Contradiction>, incoming: Vec<Contradiction>) {
        let known: std::collections::BTreeSet<Uuid> = existing.iter().map(|c| c.id).collect();
        for new in incoming {
            if known.contains(&new.id) {
                continue;
            }
            existing.retain(|old| {
                !(old.subject_key == new.subject_key
                    && old.field_key == new.field_key
                    && old.claims.iter().all(|c| new.claims.contains(c)))
            });
            existing.push(new);
        }
        existing.sort_by(|a, b| {
            (a.subject_key.as_str(), a.field_key.as_str(), a.id)
                .cmp(&(b.subject_key.as_str(), b.field_key.as_str(), b.id))
        });
    }
}
