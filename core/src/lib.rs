pub mod corpus;
pub mod engine;
pub mod error;
pub mod index;
pub mod persist;
pub mod tokenizer;

pub use engine::{Bm25Engine, Bm25Params, EngineConfig, ResultFilter, ScoreExplanation, SearchHit, TermExplanation};
pub use error::{RankError, Result};
pub use index::{InvertedIndex, Posting};
pub use tokenizer::Tokenizer;

pub type DocId = u32;
