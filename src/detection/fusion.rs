//! Fusion of pattern-lane and AI-lane candidates.
//!
//! Candidates that share a category and overlap by more than the configured
//! fraction merge into one violation: `source = both` when lanes differ,
//! `confidence = max`, `severity = max`. Candidates are sorted before
//! clustering and clusters are connected components of the pairwise-overlap
//! graph, so merging is associative and independent of input order.

use crate::models::enums::{ViolationCategory, ViolationSource};
use crate::models::CharRange;

/// A pre-fusion violation candidate from either lane.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub category: ViolationCategory,
    pub rule: Option<String>,
    pub description: String,
    pub severity: u8,
    pub excerpt: String,
    pub range: CharRange,
    pub source: ViolationSource,
    pub confidence: f64,
}

/// Merge overlapping same-category candidates. Output is sorted by
/// `(range.start, range.end, category)`.
pub fn fuse(mut candidates: Vec<Candidate>, overlap_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        (a.range, a.category, a.source, &a.rule).cmp(&(b.range, b.category, b.source, &b.rule))
    });

    // Union-find over sorted candidates: same category + sufficient overlap.
    let mut parent: Vec<usize> = (0..candidates.len()).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut walk = i;
        while parent[walk] != root {
            let next = parent[walk];
            parent[walk] = root;
            walk = next;
        }
        root
    }

    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            if candidates[i].category != candidates[j].category {
                continue;
            }
            if candidates[i].range.overlap_fraction(&candidates[j].range) > overlap_threshold {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut clusters: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for i in 0..candidates.len() {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut fused: Vec<Candidate> = clusters
        .into_values()
        .map(|members| merge_cluster(&candidates, &members))
        .collect();

    fused.sort_by(|a, b| (a.range, a.category).cmp(&(b.range, b.category)));
    fused
}

/// Collapse one cluster. The representative for text fields is the member
/// with the highest severity; pattern-lane members win ties so the merged
/// violation keeps its rule name.
fn merge_cluster(candidates: &[Candidate], members: &[usize]) -> Candidate {
    let representative = members
        .iter()
        .copied()
        .max_by_key(|&i| {
            let c = &candidates[i];
            (
                c.severity,
                c.source == ViolationSource::PatternMatch,
                std::cmp::Reverse(c.range.start),
            )
        })
        .map(|i| &candidates[i])
        .expect("cluster is non-empty");

    let mut merged = representative.clone();
    for &i in members {
        let c = &candidates[i];
        merged.range = merged.range.union(&c.range);
        merged.severity = merged.severity.max(c.severity);
        merged.confidence = merged.confidence.max(c.confidence);
        merged.source = merged.source.fuse(c.source);
        if merged.rule.is_none() {
            merged.rule = c.rule.clone();
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        category: ViolationCategory,
        start: usize,
        end: usize,
        source: ViolationSource,
        severity: u8,
        confidence: f64,
    ) -> Candidate {
        Candidate {
            category,
            rule: match source {
                ViolationSource::PatternMatch => Some("test_rule".into()),
                _ => None,
            },
            description: "test".into(),
            severity,
            excerpt: "…".into(),
            range: CharRange::new(start, end),
            source,
            confidence,
        }
    }

    #[test]
    fn overlapping_same_category_merges_to_both() {
        let fused = fuse(
            vec![
                candidate(ViolationCategory::DueProcess, 10, 50, ViolationSource::PatternMatch, 4, 1.0),
                candidate(ViolationCategory::DueProcess, 20, 55, ViolationSource::AiAssisted, 3, 0.7),
            ],
            0.5,
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].source, ViolationSource::Both);
        assert_eq!(fused[0].severity, 4);
        assert_eq!(fused[0].confidence, 1.0);
        assert_eq!(fused[0].range, CharRange::new(10, 55));
        assert_eq!(fused[0].rule.as_deref(), Some("test_rule"));
    }

    #[test]
    fn different_categories_never_merge() {
        let fused = fuse(
            vec![
                candidate(ViolationCategory::DueProcess, 10, 50, ViolationSource::PatternMatch, 4, 1.0),
                candidate(ViolationCategory::Custody, 10, 50, ViolationSource::AiAssisted, 3, 0.7),
            ],
            0.5,
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn insufficient_overlap_keeps_candidates_distinct() {
        let fused = fuse(
            vec![
                candidate(ViolationCategory::Procedural, 0, 100, ViolationSource::PatternMatch, 2, 1.0),
                candidate(ViolationCategory::Procedural, 90, 130, ViolationSource::AiAssisted, 2, 0.6),
            ],
            0.5,
        );
        // Overlap is 10 of the shorter range's 40 chars — 25%, below threshold.
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn fusion_is_order_independent() {
        let a = candidate(ViolationCategory::DueProcess, 10, 50, ViolationSource::PatternMatch, 4, 1.0);
        let b = candidate(ViolationCategory::DueProcess, 20, 55, ViolationSource::AiAssisted, 3, 0.7);
        let c = candidate(ViolationCategory::Procedural, 200, 240, ViolationSource::PatternMatch, 2, 1.0);

        let orderings = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ];

        let results: Vec<Vec<Candidate>> =
            orderings.into_iter().map(|v| fuse(v, 0.5)).collect();
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
        assert_eq!(results[0].len(), 2);
    }

    #[test]
    fn overlap_chains_merge_transitively() {
        // a overlaps b, b overlaps c, a does not overlap c — one cluster.
        let fused = fuse(
            vec![
                candidate(ViolationCategory::Procedural, 0, 40, ViolationSource::PatternMatch, 2, 1.0),
                candidate(ViolationCategory::Procedural, 10, 70, ViolationSource::AiAssisted, 2, 0.5),
                candidate(ViolationCategory::Procedural, 45, 80, ViolationSource::AiAssisted, 3, 0.9),
            ],
            0.5,
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].range, CharRange::new(0, 80));
        assert_eq!(fused[0].severity, 3);
    }
}
