use thiserror::Error;

/// Main error type for segdex operations
#[derive(Error, Debug)]
pub enum SegdexError {
    #[error("Corrupt index: {0}")]
    Corruption(String),

    #[error("Lock already held: {0}")]
    LockContention(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Query parse error at position {position}: {message}")]
    QueryParse { position: usize, message: String },

    #[error("No index found: {0}")]
    IndexNotFound(String),

    #[error("Document {doc} out of range (max_doc {max_doc})")]
    DocumentOutOfRange { doc: u32, max_doc: u32 },

    #[error("Query expands to more than {0} clauses")]
    TooManyClauses(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for segdex operations
pub type Result<T> = std::result::Result<T, SegdexError>;

impl SegdexError {
    /// Shorthand for a corruption error with a formatted message
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SegdexError::Corruption(msg.into())
    }

    /// Shorthand for a parse error at `position`
    pub fn parse(position: usize, msg: impl Into<String>) -> Self {
        SegdexError::QueryParse {
            position,
            message: msg.into(),
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, SegdexError::LockContention(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, SegdexError::Corruption(_))
    }
}

impl From<fst::Error> for SegdexError {
    fn from(err: fst::Error) -> Self {
        match err {
            fst::Error::Io(e) => SegdexError::Io(e),
            other => SegdexError::Corruption(format!("term dictionary: {}", other)),
        }
    }
}
