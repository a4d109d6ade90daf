//! Document similarity search over a case.
//!
//! Documents are embedded as unit-normalized term-frequency vectors, derived
//! on demand and kept in a bounded cache keyed by document id. Eviction only
//! drops the derived vector — the canonical text always lives in the case
//! snapshot, so a cache miss means recomputation, never data loss.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::models::CaseSnapshot;

pub type TermVector = BTreeMap<String, f64>;

/// Tokens this short carry no signal for similarity.
const MIN_TOKEN_LEN: usize = 2;

/// Unit-normalized term-frequency vector for a text.
pub fn embed(text: &str) -> TermVector {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
    {
        *counts.entry(token.to_lowercase()).or_default() += 1.0;
    }

    let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in counts.values_mut() {
            *value /= norm;
        }
    }
    counts
}

/// Cosine similarity of two unit vectors. Sparse dot product — iterate the
/// smaller map.
pub fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|w| weight * w))
        .sum()
}

// ---------------------------------------------------------------------------
// VectorCache
// ---------------------------------------------------------------------------

/// Bounded LRU cache of derived document vectors.
struct VectorCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (u64, Arc<TermVector>)>,
}

impl VectorCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, document_id: &str) -> Option<Arc<TermVector>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(document_id).map(|(stamp, vector)| {
            *stamp = tick;
            Arc::clone(vector)
        })
    }

    fn insert(&mut self, document_id: String, vector: Arc<TermVector>) {
        self.tick += 1;
        self.entries.insert(document_id, (self.tick, vector));
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SearchIndex
// ---------------------------------------------------------------------------

pub struct SearchIndex {
    cache: Mutex<VectorCache>,
}

impl SearchIndex {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            cache: Mutex::new(VectorCache::new(config.search.vector_cache_capacity)),
        }
    }

    fn vector_for(&self, snapshot: &CaseSnapshot, document_id: &str) -> Option<Arc<TermVector>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(vector) = cache.get(document_id) {
                return Some(vector);
            }
        }
        let document = snapshot.documents.get(document_id)?;
        let vector = Arc::new(embed(&document.text));
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(document_id.to_string(), Arc::clone(&vector));
        }
        Some(vector)
    }

    /// Rank the case's documents against a free-text query, best first.
    /// Zero-similarity documents are omitted.
    pub fn search_case(
        &self,
        snapshot: &CaseSnapshot,
        query: &str,
        limit: usize,
    ) -> Vec<(String, f64)> {
        let query_vector = embed(query);
        let mut scored: Vec<(String, f64)> = snapshot
            .document_ids
            .iter()
            .filter_map(|id| {
                let vector = self.vector_for(snapshot, id)?;
                let score = cosine(&query_vector, &vector);
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }

    /// Documents most similar to a given one, excluding itself.
    pub fn similar_documents(
        &self,
        snapshot: &CaseSnapshot,
        document_id: &str,
        limit: usize,
    ) -> Vec<(String, f64)> {
        let Some(reference) = self.vector_for(snapshot, document_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(String, f64)> = snapshot
            .document_ids
            .iter()
            .filter(|id| id.as_str() != document_id)
            .filter_map(|id| {
                let vector = self.vector_for(snapshot, id)?;
                let score = cosine(&reference, &vector);
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }
}
