use testboard_schema::ShapeError;

/// All errors that can be returned by a RecordStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Fetching records failed. Transient from the caller's point of view:
    /// it is surfaced, not retried.
    #[error("failed to read records of kind '{kind}': {message}")]
    Read { kind: String, message: String },

    /// Persisting a mutation failed.
    #[error("failed to write records of kind '{kind}': {message}")]
    Write { kind: String, message: String },

    /// No record with the given (kind, id).
    #[error("record not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    /// The kind is not in the active schema, or failed to compile.
    #[error("no compiled shape for kind '{kind}'")]
    NoShape { kind: String },

    /// The document was rejected by the kind's compiled shape.
    #[error(transparent)]
    Validation(#[from] ShapeError),

    /// The change feed ended while a stream was still open.
    #[error("change feed for kind '{kind}' closed unexpectedly")]
    StreamBroken { kind: String },

    /// The store URL could not be understood.
    #[error("invalid store URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}
