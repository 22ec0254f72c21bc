use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RankError {
    #[error("cannot build an index from an empty document collection")]
    EmptyCorpus,

    #[error("document id {doc_id} out of range for a corpus of {num_docs} documents")]
    InvalidDocumentId { doc_id: i64, num_docs: u32 },
}

pub type Result<T> = std::result::Result<T, RankError>;
