//! Okapi BM25 scoring over a frozen [`InvertedIndex`].
//!
//! score(D, Q) = Σ idf(q) · tf · (k1 + 1) / (tf + k1 · (1 - b + b · |D| / avgdl))
//!
//! `score`, `search` and `explain_score` share one per-term contribution
//! function and add contributions in query order, so an explanation's
//! `total_score` is bit-identical to the headline score.

use crate::index::InvertedIndex;
use crate::tokenizer::Tokenizer;
use crate::{DocId, RankError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Which documents `search` may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFilter {
    /// Drop documents whose score is exactly 0.
    #[default]
    NonZero,
    /// Rank every document, zero scores included.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub params: Bm25Params,
    pub tokenizer: Tokenizer,
    pub results: ResultFilter,
    /// Truncation used when `search` is called without an explicit `top_n`.
    pub top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { params: Bm25Params::default(), tokenizer: Tokenizer::default(), results: ResultFilter::default(), top_n: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermExplanation {
    pub term: String,
    pub term_frequency: u32,
    pub idf: f64,
    /// k1 · (1 - b + b · |D| / avgdl), independent of tf.
    pub doc_length_factor: f64,
    pub score_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplanation {
    pub doc_id: DocId,
    pub query: String,
    pub terms: Vec<TermExplanation>,
    pub total_score: f64,
}

/// Documents plus their index, immutable after construction. Share it behind
/// an `Arc`; rebuilding means constructing a new engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Engine {
    documents: Vec<String>,
    index: InvertedIndex,
    config: EngineConfig,
}

impl Bm25Engine {
    pub fn new(documents: Vec<String>) -> Result<Self> {
        Self::with_config(documents, EngineConfig::default())
    }

    pub fn with_config(documents: Vec<String>, config: EngineConfig) -> Result<Self> {
        let index = InvertedIndex::build(&documents, &config.tokenizer)?;
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            tokenizer = %config.tokenizer,
            k1 = config.params.k1,
            b = config.params.b,
            "bm25 engine ready"
        );
        Ok(Self { documents, index, config })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn index(&self) -> &InvertedIndex { &self.index }

    pub fn documents(&self) -> &[String] { &self.documents }

    pub fn num_docs(&self) -> u32 { self.index.num_docs() }

    pub fn avg_doc_length(&self) -> f64 { self.index.avg_doc_length() }

    pub fn idf(&self, term: &str) -> f64 { self.index.idf(term) }

    pub fn doc_length(&self, doc_id: DocId) -> Result<u32> {
        let doc_id = self.check(doc_id)?;
        Ok(self.index.doc_length(doc_id).unwrap_or(0))
    }

    /// Validates an id coming from outside the crate (CLI, HTTP), where it may be negative.
    pub fn resolve_doc_id(&self, raw: i64) -> Result<DocId> {
        let num_docs = self.num_docs();
        match DocId::try_from(raw) {
            Ok(doc_id) if doc_id < num_docs => Ok(doc_id),
            _ => Err(RankError::InvalidDocumentId { doc_id: raw, num_docs }),
        }
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<&str> {
        let doc_id = self.check(doc_id)?;
        Ok(&self.documents[doc_id as usize])
    }

    pub fn score(&self, query: &str, doc_id: DocId) -> Result<f64> {
        let doc_id = self.check(doc_id)?;
        let length_factor = self.doc_length_factor(doc_id);
        let mut score = 0.0;
        for term in self.config.tokenizer.tokenize(query) {
            let tf = self.index.term_frequency(&term, doc_id);
            if tf == 0 {
                continue;
            }
            score += self.contribution(tf, self.index.idf(&term), length_factor);
        }
        Ok(score)
    }

    /// Ranks the corpus for `query`. Scores descend; equal scores keep ascending doc id.
    /// `top_n = None` falls back to the configured default.
    pub fn search(&self, query: &str, top_n: Option<usize>) -> Vec<SearchHit> {
        self.search_with(query, top_n.unwrap_or(self.config.top_n), self.config.results)
    }

    /// `search` with the truncation and zero-score policy given per call.
    pub fn search_with(&self, query: &str, top_n: usize, results: ResultFilter) -> Vec<SearchHit> {
        let mut scores = vec![0.0f64; self.documents.len()];
        for term in self.config.tokenizer.tokenize(query) {
            let idf = self.index.idf(&term);
            for posting in self.index.postings(&term) {
                let length_factor = self.doc_length_factor(posting.doc_id);
                scores[posting.doc_id as usize] += self.contribution(posting.term_frequency, idf, length_factor);
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .enumerate()
            .map(|(doc_id, score)| SearchHit { doc_id: doc_id as DocId, score })
            .filter(|hit| results == ResultFilter::All || hit.score != 0.0)
            .collect();
        hits.sort_by(rank_order);
        hits.truncate(top_n);
        tracing::debug!(query, hits = hits.len(), "search complete");
        hits
    }

    /// Per-term breakdown of `score(query, doc_id)`, one entry per query token in order.
    pub fn explain_score(&self, query: &str, doc_id: DocId) -> Result<ScoreExplanation> {
        let doc_id = self.check(doc_id)?;
        let length_factor = self.doc_length_factor(doc_id);
        let mut terms = Vec::new();
        let mut total_score = 0.0;
        for term in self.config.tokenizer.tokenize(query) {
            let tf = self.index.term_frequency(&term, doc_id);
            let idf = self.index.idf(&term);
            let score_contribution = if tf == 0 { 0.0 } else { self.contribution(tf, idf, length_factor) };
            if tf > 0 {
                total_score += score_contribution;
            }
            terms.push(TermExplanation { term, term_frequency: tf, idf, doc_length_factor: length_factor, score_contribution });
        }
        Ok(ScoreExplanation { doc_id, query: query.to_string(), terms, total_score })
    }

    fn check(&self, doc_id: DocId) -> Result<DocId> {
        if doc_id < self.num_docs() {
            Ok(doc_id)
        } else {
            Err(RankError::InvalidDocumentId { doc_id: doc_id as i64, num_docs: self.num_docs() })
        }
    }

    fn doc_length_factor(&self, doc_id: DocId) -> f64 {
        let Bm25Params { k1, b } = self.config.params;
        k1 * (1.0 - b + b * self.index.length_ratio(doc_id))
    }

    fn contribution(&self, tf: u32, idf: f64, length_factor: f64) -> f64 {
        let tf = tf as f64;
        idf * tf * (self.config.params.k1 + 1.0) / (tf + length_factor)
    }
}

fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn pets() -> Bm25Engine {
        Bm25Engine::new(docs(&["the cat sat", "the dog sat on the mat", "cats and dogs are great"])).unwrap()
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert_eq!(Bm25Engine::new(Vec::new()).unwrap_err(), RankError::EmptyCorpus);
    }

    #[test]
    fn cat_ranks_first_document_highest() {
        let engine = pets();
        assert!(engine.idf("cat") > 0.0);
        let hits = engine.search("cat", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, 0);
        assert!(hits[0].score > 0.0);
        assert_eq!(engine.score("cat", 1).unwrap(), 0.0);
        assert_eq!(engine.score("cat", 2).unwrap(), 0.0);
    }

    #[test]
    fn score_matches_hand_computed_value() {
        let engine = pets();
        let avgdl = 14.0 / 3.0;
        let idf = ((3.0 - 1.0 + 0.5) / (1.0 + 0.5) + 1.0f64).ln();
        let expected = idf * 1.0 * 2.5 / (1.0 + 1.5 * (1.0 - 0.75 + 0.75 * 3.0 / avgdl));
        assert!((engine.score("cat", 0).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn unknown_term_yields_nothing_under_nonzero_filter() {
        let engine = pets();
        assert!(engine.search("xyzzy", None).is_empty());
    }

    #[test]
    fn unknown_term_ranks_all_documents_at_zero_when_unfiltered() {
        let config = EngineConfig { results: ResultFilter::All, top_n: 10, ..EngineConfig::default() };
        let engine = Bm25Engine::with_config(pets().documents().to_vec(), config).unwrap();
        let hits = engine.search("xyzzy", None);
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn search_with_overrides_the_configured_filter() {
        let engine = pets();
        let hits = engine.search_with("cat", 10, ResultFilter::All);
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(engine.search_with("cat", 10, ResultFilter::NonZero).len(), 1);
    }

    #[test]
    fn ties_break_by_ascending_doc_id() {
        let engine = Bm25Engine::new(docs(&["alpha beta", "gamma", "alpha beta", "alpha beta"])).unwrap();
        let hits = engine.search("alpha", Some(10));
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(hits[0].score, hits[2].score);
    }

    #[test]
    fn search_truncates_to_top_n() {
        let engine = Bm25Engine::new(docs(&["a x", "a y", "a z", "a w", "a v", "a u", "b"])).unwrap();
        assert_eq!(engine.search("a", None).len(), 5);
        assert_eq!(engine.search("a", Some(2)).len(), 2);
        assert!(engine.search("a", Some(0)).is_empty());
    }

    #[test]
    fn search_scores_equal_direct_scores() {
        let engine = pets();
        for hit in engine.search("the cat sat on a mat", Some(10)) {
            assert_eq!(hit.score, engine.score("the cat sat on a mat", hit.doc_id).unwrap());
        }
    }

    #[test]
    fn explanation_covers_every_query_token() {
        let engine = pets();
        let exp = engine.explain_score("cat xyzzy dog", 0).unwrap();
        assert_eq!(exp.terms.len(), 3);
        assert_eq!(exp.terms[0].term_frequency, 1);
        assert!(exp.terms[0].score_contribution > 0.0);
        assert_eq!(exp.terms[1].idf, 0.0);
        assert_eq!(exp.terms[1].score_contribution, 0.0);
        assert_eq!(exp.terms[2].term_frequency, 0);
        assert!(exp.terms[2].idf > 0.0);
        assert_eq!(exp.terms[2].score_contribution, 0.0);
        assert_eq!(exp.terms[0].doc_length_factor, exp.terms[2].doc_length_factor);
        assert_eq!(exp.total_score, engine.score("cat xyzzy dog", 0).unwrap());
    }

    #[test]
    fn doc_length_factor_is_reported_for_absent_terms() {
        let engine = pets();
        let exp = engine.explain_score("xyzzy", 1).unwrap();
        let expected = 1.5 * (1.0 - 0.75 + 0.75 * 6.0 / (14.0 / 3.0));
        assert!((exp.terms[0].doc_length_factor - expected).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let engine = pets();
        let err = RankError::InvalidDocumentId { doc_id: 3, num_docs: 3 };
        assert_eq!(engine.score("cat", 3).unwrap_err(), err);
        assert_eq!(engine.explain_score("cat", 3).unwrap_err(), err);
        assert_eq!(engine.get_document(3).unwrap_err(), err);
        assert_eq!(
            engine.resolve_doc_id(-1).unwrap_err(),
            RankError::InvalidDocumentId { doc_id: -1, num_docs: 3 }
        );
        assert_eq!(engine.resolve_doc_id(3).unwrap_err(), err);
        assert_eq!(engine.resolve_doc_id(2).unwrap(), 2);
    }

    #[test]
    fn get_document_returns_raw_text() {
        let engine = pets();
        assert_eq!(engine.get_document(1).unwrap(), "the dog sat on the mat");
    }

    #[test]
    fn parameters_change_scores() {
        let plain = pets();
        let config = EngineConfig { params: Bm25Params { k1: 1.2, b: 0.0 }, ..EngineConfig::default() };
        let tuned = Bm25Engine::with_config(plain.documents().to_vec(), config).unwrap();
        assert_ne!(plain.score("sat", 1).unwrap(), tuned.score("sat", 1).unwrap());
        // b = 0 disables length normalization.
        assert_eq!(tuned.score("sat", 0).unwrap(), tuned.score("sat", 1).unwrap());
    }
}
