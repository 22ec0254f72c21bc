use rank_core::{Bm25Engine, EngineConfig, RankError, ResultFilter, Tokenizer};

fn pets() -> Vec<String> {
    ["the cat sat", "the dog sat on the mat", "cats and dogs are great"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn transcript() -> Vec<String> {
    [
        "Good morning, and welcome to the fourth quarter and full year earnings conference call.",
        "Thank you, and good morning everyone. Medical costs in the quarter ran ahead of our expectations.",
        "Thanks for the question. These rates are preliminary and won't be finalized until April.",
        "Our guidance for next year reflects continued growth in revenue and disciplined cost management.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

const QUERIES: &[&str] = &["", "cat", "the cat", "sat sat mat", "xyzzy", "dogs, cats!", "good morning quarter", "revenue growth guidance"];

#[test]
fn rebuilding_gives_bit_identical_scores() {
    for corpus in [pets(), transcript()] {
        let a = Bm25Engine::new(corpus.clone()).unwrap();
        let b = Bm25Engine::new(corpus).unwrap();
        for q in QUERIES {
            for d in 0..a.num_docs() {
                assert_eq!(a.score(q, d).unwrap().to_bits(), b.score(q, d).unwrap().to_bits());
            }
            assert_eq!(a.search(q, Some(10)), b.search(q, Some(10)));
        }
    }
}

#[test]
fn explanation_sums_to_score() {
    for tokenizer in [Tokenizer::Whitespace, Tokenizer::Word, Tokenizer::Analyzed] {
        let config = EngineConfig { tokenizer, ..EngineConfig::default() };
        let engine = Bm25Engine::with_config(transcript(), config).unwrap();
        for q in QUERIES {
            for d in 0..engine.num_docs() {
                let exp = engine.explain_score(q, d).unwrap();
                let summed: f64 = exp.terms.iter().map(|t| t.score_contribution).sum();
                let score = engine.score(q, d).unwrap();
                assert!((summed - score).abs() < 1e-9, "{q:?} doc {d}: {summed} vs {score}");
                assert_eq!(exp.total_score, score);
            }
        }
    }
}

#[test]
fn documents_without_query_terms_score_zero() {
    let engine = Bm25Engine::new(transcript()).unwrap();
    for d in 0..engine.num_docs() {
        let doc = engine.get_document(d).unwrap().to_lowercase();
        if !doc.contains("april") {
            assert_eq!(engine.score("april", d).unwrap(), 0.0);
        }
        assert_eq!(engine.score("", d).unwrap(), 0.0);
    }
}

#[test]
fn empty_query_explains_to_nothing() {
    let engine = Bm25Engine::new(pets()).unwrap();
    let exp = engine.explain_score("", 0).unwrap();
    assert!(exp.terms.is_empty());
    assert_eq!(exp.total_score, 0.0);
    assert!(engine.search("", None).is_empty());
}

#[test]
fn higher_term_frequency_never_lowers_the_score() {
    // Pad with filler so every document has the same length and only tf varies.
    let docs: Vec<String> = (0..6)
        .map(|tf| {
            let mut words = vec!["margin"; tf];
            words.extend(std::iter::repeat("filler").take(8 - tf));
            words.join(" ")
        })
        .chain(std::iter::once("unrelated text entirely".to_string()))
        .collect();
    let engine = Bm25Engine::new(docs).unwrap();
    let scores: Vec<f64> = (0..6).map(|d| engine.score("margin", d).unwrap()).collect();
    for pair in scores.windows(2) {
        assert!(pair[1] >= pair[0], "{scores:?}");
    }
    assert_eq!(scores[0], 0.0);
    assert!(scores[5] > scores[1]);
}

#[test]
fn search_is_sorted_descending_with_stable_ties() {
    let config = EngineConfig { results: ResultFilter::All, top_n: 100, ..EngineConfig::default() };
    let engine = Bm25Engine::with_config(transcript(), config).unwrap();
    for q in QUERIES {
        let hits = engine.search(q, None);
        assert_eq!(hits.len(), engine.num_docs() as usize);
        for pair in hits.windows(2) {
            assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].doc_id < pair[1].doc_id));
        }
    }
}

#[test]
fn range_validation() {
    let engine = Bm25Engine::new(pets()).unwrap();
    let n = engine.num_docs() as i64;
    for raw in [-1, n] {
        let err = engine.resolve_doc_id(raw).unwrap_err();
        assert_eq!(err, RankError::InvalidDocumentId { doc_id: raw, num_docs: 3 });
    }
    assert!(matches!(engine.score("cat", 3), Err(RankError::InvalidDocumentId { .. })));
    assert!(matches!(engine.get_document(u32::MAX), Err(RankError::InvalidDocumentId { .. })));
}

#[test]
fn tokenizer_policy_changes_matches() {
    let docs = vec!["the cat sat.".to_string(), "a dog".to_string()];
    let ws = Bm25Engine::with_config(docs.clone(), EngineConfig { tokenizer: Tokenizer::Whitespace, ..EngineConfig::default() }).unwrap();
    let word = Bm25Engine::with_config(docs, EngineConfig { tokenizer: Tokenizer::Word, ..EngineConfig::default() }).unwrap();
    assert_eq!(ws.score("sat", 0).unwrap(), 0.0);
    assert!(word.score("sat", 0).unwrap() > 0.0);
}

#[test]
fn engine_can_be_shared_across_threads() {
    let engine = std::sync::Arc::new(Bm25Engine::new(transcript()).unwrap());
    let expected = engine.search("good morning", None);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.search("good morning", None))
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}
