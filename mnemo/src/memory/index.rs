//! Keyword + pseudo-semantic index over committed records.
//!
//! The index is a derived cache: it is built from the committed store on open and
//! updated incrementally on commit, never persisted. It keeps only tokens and
//! vectors; `strength` and `updated_ns` are read from the store at query time
//! through a lookup closure, so reinforcement and decay are visible immediately.
//!
//! Ranking:
//! `score = w_keyword·overlap + w_semantic·cosine − w_age·age_days + w_confidence·max(0, strength)`
//! sorted by descending score, ties broken by ascending id.

use crate::config::ScoringWeights;
use crate::memory::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

pub const SEMANTIC_DIMENSIONS: usize = 256;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
const AGE_NORMALIZER_SECONDS: f64 = 86_400.0;

pub type SemanticVector = [f32; SEMANTIC_DIMENSIONS];

/// Lowercased maximal runs of ASCII alphanumerics, sorted and deduplicated.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Stable 64-bit token hash: the first 8 bytes of SHA-256, little-endian.
pub fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Hash-derived, L2-normalized vector. All-zero when there are no tokens.
pub fn semantic_vector(tokens: &[String]) -> SemanticVector {
    let mut vec = [0.0f32; SEMANTIC_DIMENSIONS];
    for token in tokens {
        let h = token_hash(token);
        for window in 0..4 {
            let shift = window * 16;
            let idx = ((h >> shift) & 0xFF) as usize;
            let mag = ((h >> (shift + 8)) & 0xFF) as f32 / 255.0;
            vec[idx] += mag * 2.0 - 1.0;
        }
    }
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        let inv = 1.0 / norm;
        for v in vec.iter_mut() {
            *v *= inv;
        }
    }
    vec
}

/// Dot product; equals cosine similarity for normalized inputs.
pub fn cosine(a: &SemanticVector, b: &SemanticVector) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Fraction of query tokens present in the (sorted) record tokens.
pub fn keyword_overlap(query_tokens: &[String], record_tokens: &[String]) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matches = query_tokens
        .iter()
        .filter(|t| record_tokens.binary_search(t).is_ok())
        .count();
    matches as f32 / query_tokens.len() as f32
}

/// Days elapsed since `updated_ns`; zero for timestamps in the future.
pub fn age_penalty(now_ns: u64, updated_ns: u64) -> f32 {
    let age_ns = now_ns.saturating_sub(updated_ns);
    (age_ns as f64 / NANOS_PER_SECOND / AGE_NORMALIZER_SECONDS) as f32
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub tokens: Vec<String>,
    pub vector: SemanticVector,
}

impl IndexEntry {
    fn from_text(text: &str) -> Self {
        let tokens = tokenize(text);
        let vector = semantic_vector(&tokens);
        Self { tokens, vector }
    }
}

/// Inverted keyword index plus per-record semantic vectors.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    keywords: HashMap<String, Vec<MemoryId>>,
    entries: HashMap<MemoryId, IndexEntry>,
    weights: ScoringWeights,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

impl MemoryIndex {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            keywords: HashMap::new(),
            entries: HashMap::new(),
            weights,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MemoryId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn entry(&self, id: MemoryId) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    /// Ids whose token set contains `token`, ascending.
    pub fn postings(&self, token: &str) -> &[MemoryId] {
        self.keywords.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    fn remove_postings(&mut self, id: MemoryId, tokens: &[String]) {
        for token in tokens {
            if let Some(ids) = self.keywords.get_mut(token) {
                if let Ok(pos) = ids.binary_search(&id) {
                    ids.remove(pos);
                }
                if ids.is_empty() {
                    self.keywords.remove(token);
                }
            }
        }
    }

    fn upsert(&mut self, record: &MemoryRecord) {
        let entry = IndexEntry::from_text(&record.text);
        if let Some(old) = self.entries.remove(&record.id) {
            self.remove_postings(record.id, &old.tokens);
        }
        for token in &entry.tokens {
            let ids = self.keywords.entry(token.clone()).or_default();
            if let Err(pos) = ids.binary_search(&record.id) {
                ids.insert(pos, record.id);
            }
        }
        self.entries.insert(record.id, entry);
    }

    /// Clear and rebuild from a full record set.
    pub fn build_from_snapshot(&mut self, records: &[MemoryRecord]) {
        self.keywords.clear();
        self.entries.clear();
        for record in records {
            self.upsert(record);
        }
        log::info!(
            "[MemoryIndex] Built index: {} records, {} tokens",
            self.entries.len(),
            self.keywords.len()
        );
    }

    /// Upsert newly committed records, dropping stale postings first.
    pub fn update_on_commit(&mut self, records: &[MemoryRecord]) {
        for record in records {
            self.upsert(record);
        }
        log::debug!("[MemoryIndex] Indexed {} committed records", records.len());
    }

    /// Rank candidates for `query` at time `now_ns`.
    ///
    /// `lookup` supplies the current committed record for an id; candidates it
    /// cannot resolve are skipped.
    pub fn query<'a, F>(&self, query: &MemoryQuery, now_ns: u64, lookup: F) -> Vec<MemoryResult>
    where
        F: Fn(MemoryId) -> Option<&'a MemoryRecord>,
    {
        let query_tokens = tokenize(&query.text);
        if query.limit == 0 {
            return Vec::new();
        }
        let query_vector = semantic_vector(&query_tokens);

        let candidates: BTreeSet<MemoryId> = if query_tokens.is_empty() {
            self.entries.keys().copied().collect()
        } else {
            query_tokens
                .iter()
                .flat_map(|t| self.postings(t).iter().copied())
                .collect()
        };

        let w = &self.weights;
        let mut results: Vec<MemoryResult> = Vec::with_capacity(candidates.len());
        for id in candidates {
            let entry = match self.entries.get(&id) {
                Some(entry) => entry,
                None => continue,
            };
            let record = match lookup(id) {
                Some(record) => record,
                None => {
                    log::debug!("[MemoryIndex] Indexed id {} missing from store; skipped", id);
                    continue;
                }
            };
            let overlap = keyword_overlap(&query_tokens, &entry.tokens);
            let similarity = cosine(&query_vector, &entry.vector);
            let age = age_penalty(now_ns, record.updated_ns);
            let confidence = record.strength.max(0.0);
            let score = w.keyword * overlap + w.semantic * similarity - w.age * age
                + w.confidence * confidence;
            results.push(MemoryResult {
                record: record.clone(),
                score,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        results.truncate(query.limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rec(id: u64, text: &str, updated_ns: u64, strength: f32) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId(id),
            text: text.to_string(),
            created_ns: 0,
            updated_ns,
            strength,
        }
    }

    fn store_of(records: &[MemoryRecord]) -> BTreeMap<MemoryId, MemoryRecord> {
        records.iter().map(|r| (r.id, r.clone())).collect()
    }

    #[test]
    fn test_tokenize_splits_lowercases_and_dedups() {
        assert_eq!(
            tokenize("Hello, WORLD! hello-world 42x café"),
            vec!["42x", "caf", "hello", "world"]
        );
        assert!(tokenize("  ...  ").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_semantic_vector_is_normalized_and_deterministic() {
        let tokens = tokenize("alpha beta gamma");
        let a = semantic_vector(&tokens);
        let b = semantic_vector(&tokens);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-4);

        let empty = semantic_vector(&[]);
        assert!(empty.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_token_hash_is_stable() {
        assert_eq!(token_hash("alpha"), token_hash("alpha"));
        assert_ne!(token_hash("alpha"), token_hash("beta"));
    }

    #[test]
    fn test_keyword_overlap_and_age() {
        let q = tokenize("alpha beta");
        let r = tokenize("alpha gamma");
        assert_eq!(keyword_overlap(&q, &r), 0.5);
        assert_eq!(keyword_overlap(&[], &r), 0.0);
        assert_eq!(age_penalty(86_400_000_000_000, 0), 1.0);
        assert_eq!(age_penalty(0, 5), 0.0);
    }

    #[test]
    fn test_or_semantics_and_limit() {
        let records = vec![
            rec(1, "alpha one", 0, 1.0),
            rec(2, "beta two", 0, 1.0),
            rec(3, "gamma three", 0, 1.0),
        ];
        let store = store_of(&records);
        let mut index = MemoryIndex::default();
        index.build_from_snapshot(&records);

        let hits = index.query(&MemoryQuery::new("alpha beta", 10), 0, |id| store.get(&id));
        let ids: Vec<u64> = hits.iter().map(|r| r.record.id.value()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&2));

        assert!(index.query(&MemoryQuery::new("alpha", 0), 0, |id| store.get(&id)).is_empty());
        assert_eq!(index.query(&MemoryQuery::all(2), 0, |id| store.get(&id)).len(), 2);
        assert_eq!(index.query(&MemoryQuery::all(100), 0, |id| store.get(&id)).len(), 3);
        assert!(index.query(&MemoryQuery::new("delta", 10), 0, |id| store.get(&id)).is_empty());
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let records = vec![rec(3, "same", 0, 1.0), rec(1, "same", 0, 1.0), rec(2, "same", 0, 1.0)];
        let store = store_of(&records);
        let mut index = MemoryIndex::default();
        index.build_from_snapshot(&records);

        let hits = index.query(&MemoryQuery::new("same", 10), 0, |id| store.get(&id));
        let ids: Vec<u64> = hits.iter().map(|r| r.record.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_score_components() {
        let weights = ScoringWeights {
            keyword: 1.0,
            semantic: 0.0,
            age: 1.0,
            confidence: 1.0,
        };
        let day = 86_400_000_000_000u64;
        let records = vec![rec(1, "alpha beta", 0, 0.5), rec(2, "alpha", day, 2.0)];
        let store = store_of(&records);
        let mut index = MemoryIndex::new(weights);
        index.build_from_snapshot(&records);

        let hits = index.query(&MemoryQuery::new("alpha beta", 10), 2 * day, |id| store.get(&id));
        // id 1: overlap 1.0, age 2 days, strength 0.5 → -0.5
        // id 2: overlap 0.5, age 1 day, strength 2.0 → 1.5
        assert_eq!(hits[0].record.id, MemoryId(2));
        assert!((hits[0].score - 1.5).abs() < 1e-5);
        assert!((hits[1].score + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_update_on_commit_replaces_stale_postings() {
        let mut index = MemoryIndex::default();
        index.build_from_snapshot(&[rec(1, "alpha", 0, 1.0)]);
        assert_eq!(index.postings("alpha"), &[MemoryId(1)]);

        index.update_on_commit(&[rec(1, "beta", 0, 1.0), rec(2, "beta", 0, 1.0)]);
        assert!(index.postings("alpha").is_empty());
        assert_eq!(index.postings("beta"), &[MemoryId(1), MemoryId(2)]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_scoring_reads_live_strength_from_lookup() {
        let records = vec![rec(1, "alpha", 0, 0.0), rec(2, "alpha", 0, 0.0)];
        let mut store = store_of(&records);
        let mut index = MemoryIndex::default();
        index.build_from_snapshot(&records);

        store.get_mut(&MemoryId(2)).unwrap().strength = 5.0;
        let hits = index.query(&MemoryQuery::new("alpha", 10), 0, |id| store.get(&id));
        assert_eq!(hits[0].record.id, MemoryId(2));
        assert_eq!(hits[0].record.strength, 5.0);
    }

    #[test]
    fn test_unresolvable_candidates_are_skipped() {
        let mut index = MemoryIndex::default();
        index.build_from_snapshot(&[rec(1, "alpha", 0, 1.0)]);
        let empty: BTreeMap<MemoryId, MemoryRecord> = BTreeMap::new();
        assert!(index.query(&MemoryQuery::all(10), 0, |id| empty.get(&id)).is_empty());
    }
}
