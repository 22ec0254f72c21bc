use crate::tokenizer::Tokenizer;
use crate::{DocId, RankError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_frequency: u32,
}

/// Frozen inverted index over a document collection.
///
/// Holds both posting forms: `postings` lists `(doc_id, tf)` pairs sorted by
/// doc id, and `doc_terms` gives each document's term-frequency map, so
/// membership and `tf` lookups for a single document need no posting scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    doc_terms: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
    idf: HashMap<String, f64>,
}

impl InvertedIndex {
    pub fn build<S: AsRef<str>>(documents: &[S], tokenizer: &Tokenizer) -> Result<Self> {
        if documents.is_empty() {
            return Err(RankError::EmptyCorpus);
        }

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_terms = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());

        for (idx, doc) in documents.iter().enumerate() {
            let doc_id = idx as DocId;
            let tokens = tokenizer.tokenize(doc.as_ref());
            doc_lengths.push(tokens.len() as u32);

            let mut tf_counts: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf_counts.entry(token).or_insert(0) += 1;
            }
            // Documents are visited in id order, so every posting list stays sorted.
            for (term, tf) in tf_counts.iter() {
                postings
                    .entry(term.clone())
                    .or_default()
                    .push(Posting { doc_id, term_frequency: *tf });
            }
            doc_terms.push(tf_counts);
        }

        let n = documents.len() as f64;
        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = total as f64 / n;

        let idf = postings
            .iter()
            .map(|(term, plist)| (term.clone(), okapi_idf(n, plist.len() as f64)))
            .collect();

        tracing::debug!(num_docs = documents.len(), num_terms = postings.len(), avg_doc_length, "built inverted index");
        Ok(Self { postings, doc_terms, doc_lengths, avg_doc_length, idf })
    }

    pub fn num_docs(&self) -> u32 { self.doc_lengths.len() as u32 }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn avg_doc_length(&self) -> f64 { self.avg_doc_length }

    pub fn doc_length(&self, doc_id: DocId) -> Option<u32> {
        self.doc_lengths.get(doc_id as usize).copied()
    }

    /// Positional postings for `term`, sorted by doc id. Empty for unseen terms.
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of the documents containing `term`, ascending.
    pub fn documents_containing<'a>(&'a self, term: &str) -> impl Iterator<Item = DocId> + 'a {
        self.postings(term).iter().map(|p| p.doc_id)
    }

    pub fn contains(&self, term: &str, doc_id: DocId) -> bool {
        self.term_frequency(term, doc_id) > 0
    }

    pub fn doc_frequency(&self, term: &str) -> u32 {
        self.postings(term).len() as u32
    }

    /// Raw occurrences of `term` in `doc_id`; 0 when absent or out of range.
    pub fn term_frequency(&self, term: &str, doc_id: DocId) -> u32 {
        self.doc_terms
            .get(doc_id as usize)
            .and_then(|terms| terms.get(term))
            .copied()
            .unwrap_or(0)
    }

    /// Precomputed IDF. Terms absent from the corpus have an IDF of 0.
    pub fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// `dl / avgdl`, defined as 1.0 when every document is empty.
    pub fn length_ratio(&self, doc_id: DocId) -> f64 {
        let dl = self.doc_length(doc_id).unwrap_or(0) as f64;
        if self.avg_doc_length > 0.0 { dl / self.avg_doc_length } else { 1.0 }
    }
}

/// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
pub fn okapi_idf(num_docs: f64, doc_freq: f64) -> f64 {
    ((num_docs - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
}
