//! Curated pattern library for the violation detection pattern lane.
//!
//! Rules are grouped: the general group always applies; the CPS and custody
//! groups activate when the document classifies as (or its text signals) a
//! CPS or family-court matter. Rules are exact by construction — a match is
//! reported with confidence 1.0.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::enums::{DocumentKind, ViolationCategory};

// ---------------------------------------------------------------------------
// Rule groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGroup {
    General,
    Cps,
    Custody,
}

pub struct PatternRule {
    pub name: &'static str,
    pub category: ViolationCategory,
    pub description: &'static str,
    pub group: RuleGroup,
    pub patterns: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("pattern rule regex is valid"))
        .collect()
}

/// The rule library, compiled once.
pub static RULE_LIBRARY: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        // ── General ────────────────────────────────────────────────────
        PatternRule {
            name: "constitutional_violation",
            category: ViolationCategory::Constitutional,
            description: "Constitutional rights violation",
            group: RuleGroup::General,
            patterns: compile(&[
                r"constitutional\s+violation",
                r"(?:fourth|fifth|fourteenth)\s+amendment\s+violation",
                r"equal\s+protection\s+violation",
            ]),
        },
        PatternRule {
            name: "removal_without_court_order",
            category: ViolationCategory::DueProcess,
            description: "Child removed without proper court authorization",
            group: RuleGroup::General,
            patterns: compile(&[
                r"removed?\s+without\s+(?:court\s+)?order",
                r"emergency\s+removal\s+without\s+hearing",
                r"taken\s+into\s+custody\s+without\s+warrant",
            ]),
        },
        PatternRule {
            name: "due_process_denial",
            category: ViolationCategory::DueProcess,
            description: "Due process rights denied",
            group: RuleGroup::General,
            patterns: compile(&[
                r"due\s+process\s+violation",
                r"denied\s+(?:due\s+)?process",
                r"denied\s+(?:the\s+)?right\s+to\s+counsel",
                r"no\s+notice\s+provided",
                r"insufficient\s+notice",
                r"ex\s+parte\s+(?:proceeding|communication)",
            ]),
        },
        PatternRule {
            name: "delayed_icpc",
            category: ViolationCategory::Procedural,
            description: "Delayed ICPC processing affecting placement",
            group: RuleGroup::General,
            patterns: compile(&[
                r"icpc\s+delay",
                r"interstate\s+compact\s+violation",
                r"delayed\s+placement\s+approval",
                r"icpc\s+not\s+completed",
            ]),
        },
        PatternRule {
            name: "missed_hearing",
            category: ViolationCategory::Procedural,
            description: "Required hearings missed or delayed",
            group: RuleGroup::General,
            patterns: compile(&[
                r"hearing\s+not\s+held",
                r"missed\s+hearing",
                r"hearing\s+postponed\s+repeatedly",
                r"no\s+permanency\s+hearing",
            ]),
        },
        PatternRule {
            name: "inadequate_reunification",
            category: ViolationCategory::CpsSpecific,
            description: "Inadequate or missing reunification efforts",
            group: RuleGroup::General,
            patterns: compile(&[
                r"no\s+reunification\s+efforts?",
                r"insufficient\s+reunification",
                r"failed\s+to\s+provide\s+services",
                r"reunification\s+not\s+attempted",
            ]),
        },
        PatternRule {
            name: "procedural_error",
            category: ViolationCategory::Procedural,
            description: "Procedural or statutory requirements not followed",
            group: RuleGroup::General,
            patterns: compile(&[
                r"procedural\s+error",
                r"improper\s+procedure",
                r"failed\s+to\s+follow\s+protocol",
                r"statutory\s+violation",
            ]),
        },
        PatternRule {
            name: "documentation_error",
            category: ViolationCategory::Procedural,
            description: "Documentation or administrative errors",
            group: RuleGroup::General,
            patterns: compile(&[
                r"missing\s+documentation",
                r"incomplete\s+records",
                r"filing\s+error",
                r"administrative\s+error",
            ]),
        },
        PatternRule {
            name: "timeline_violation",
            category: ViolationCategory::Procedural,
            description: "Timeline or deadline violations",
            group: RuleGroup::General,
            patterns: compile(&[
                r"deadline\s+missed",
                r"untimely\s+filing",
                r"late\s+submission",
                r"time\s+limit\s+exceeded",
            ]),
        },
        // ── CPS ────────────────────────────────────────────────────────
        PatternRule {
            name: "safety_plan_violation",
            category: ViolationCategory::CpsSpecific,
            description: "Safety plan violations",
            group: RuleGroup::Cps,
            patterns: compile(&[
                r"safety\s+plan\s+not\s+followed",
                r"violated\s+safety\s+plan",
                r"safety\s+plan\s+breach",
            ]),
        },
        PatternRule {
            name: "visitation_denial",
            category: ViolationCategory::CpsSpecific,
            description: "Improper denial of parent-child contact",
            group: RuleGroup::Cps,
            patterns: compile(&[
                r"visitation\s+denied",
                r"denied\s+access\s+to\s+child",
                r"supervised\s+visitation\s+cancelled",
                r"no\s+visitation\s+allowed",
            ]),
        },
        PatternRule {
            name: "case_plan_violation",
            category: ViolationCategory::CpsSpecific,
            description: "Case plan or ISP requirements not met",
            group: RuleGroup::Cps,
            patterns: compile(&[
                r"case\s+plan\s+not\s+followed",
                r"isp\s+violation",
                r"service\s+plan\s+breach",
                r"treatment\s+plan\s+ignored",
            ]),
        },
        // ── Custody ────────────────────────────────────────────────────
        PatternRule {
            name: "custody_order_violation",
            category: ViolationCategory::Custody,
            description: "Court custody orders not followed",
            group: RuleGroup::Custody,
            patterns: compile(&[
                r"custody\s+order\s+violated",
                r"parenting\s+time\s+denied",
                r"contempt\s+of\s+court",
                r"order\s+not\s+followed",
            ]),
        },
        PatternRule {
            name: "judicial_bias",
            category: ViolationCategory::DueProcess,
            description: "Evidence of judicial bias or conflict",
            group: RuleGroup::Custody,
            patterns: compile(&[
                r"judicial\s+bias",
                r"prejudiced\s+judge",
                r"biased\s+ruling",
                r"conflict\s+of\s+interest",
            ]),
        },
    ]
});

/// Whether a rule group applies to a document of the given kind/text.
/// CPS and custody groups also activate on body-text signals, since many
/// filings mention the agency without classifying as a CPS record.
pub fn group_applies(group: RuleGroup, kind: DocumentKind, text_lower: &str) -> bool {
    match group {
        RuleGroup::General => true,
        RuleGroup::Cps => {
            matches!(kind, DocumentKind::Cps | DocumentKind::ServicePlan)
                || text_lower.contains("cps")
                || text_lower.contains("child protective")
                || text_lower.contains("dhr")
        }
        RuleGroup::Custody => {
            matches!(kind, DocumentKind::Custody)
                || text_lower.contains("family court")
                || text_lower.contains("custody")
        }
    }
}

// ---------------------------------------------------------------------------
// Document kind classification
// ---------------------------------------------------------------------------

const KIND_KEYWORDS: &[(DocumentKind, &[&str])] = &[
    (DocumentKind::Petition, &["petition", "complaint", "filing"]),
    (DocumentKind::Motion, &["motion", "request", "application"]),
    (DocumentKind::Order, &["order", "judgment", "decree", "ruling"]),
    (DocumentKind::Pleading, &["answer", "response", "reply", "counter"]),
    (DocumentKind::Evidence, &["exhibit", "affidavit", "declaration", "testimony"]),
    (DocumentKind::Custody, &["custody", "visitation", "parenting", "child support"]),
    (DocumentKind::Cps, &["cps", "child protective", "dhr", "removal", "placement"]),
    (DocumentKind::ServicePlan, &["service plan", "case plan", "treatment plan", "goals"]),
];

/// Classify a document by keyword frequency. Confidence is the winning
/// kind's share of all keyword hits.
pub fn classify_kind(text: &str) -> (DocumentKind, f64) {
    let lower = text.to_lowercase();
    let mut scores: Vec<(DocumentKind, usize)> = Vec::new();

    for (kind, keywords) in KIND_KEYWORDS {
        let score: usize = keywords.iter().map(|kw| lower.matches(kw).count()).sum();
        if score > 0 {
            scores.push((*kind, score));
        }
    }

    if scores.is_empty() {
        return (DocumentKind::Unknown, 0.0);
    }

    let total: usize = scores.iter().map(|(_, s)| s).sum();
    // Deterministic winner: highest score, table order breaks ties.
    let (best_kind, best_score) = scores
        .iter()
        .copied()
        .fold((DocumentKind::Unknown, 0), |best, entry| {
            if entry.1 > best.1 {
                entry
            } else {
                best
            }
        });

    (best_kind, best_score as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_compiles_and_covers_groups() {
        let rules = &*RULE_LIBRARY;
        assert!(rules.iter().any(|r| r.group == RuleGroup::General));
        assert!(rules.iter().any(|r| r.group == RuleGroup::Cps));
        assert!(rules.iter().any(|r| r.group == RuleGroup::Custody));
    }

    #[test]
    fn right_to_counsel_matches_due_process_rule() {
        let rule = RULE_LIBRARY
            .iter()
            .find(|r| r.name == "due_process_denial")
            .unwrap();
        assert!(rule
            .patterns
            .iter()
            .any(|p| p.is_match("The parent was denied right to counsel at the hearing.")));
        assert_eq!(rule.category, ViolationCategory::DueProcess);
    }

    #[test]
    fn cps_group_activates_on_text_signal() {
        assert!(group_applies(
            RuleGroup::Cps,
            DocumentKind::Order,
            "the cps caseworker testified"
        ));
        assert!(!group_applies(RuleGroup::Cps, DocumentKind::Order, "a contract dispute"));
    }

    #[test]
    fn classify_kind_scores_keywords() {
        let (kind, confidence) =
            classify_kind("MOTION for continuance. The motion requests a new hearing date.");
        assert_eq!(kind, DocumentKind::Motion);
        assert!(confidence > 0.5);

        let (kind, confidence) = classify_kind("lorem ipsum");
        assert_eq!(kind, DocumentKind::Unknown);
        assert_eq!(confidence, 0.0);
    }
}
