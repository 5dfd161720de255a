//! Error taxonomy (see design notes §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node not found: {node_type}/{key}")]
    NodeNotFound { node_type: String, key: String },

    #[error("relationship not found: {rel_type}/{rel_key}")]
    RelationshipNotFound { rel_type: String, rel_key: String },

    #[error("backend row/super-column not found: {table}/{row}")]
    BackendNotFound { table: String, row: String },

    #[error("backend failure")]
    BackendFailure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("value type not supported by the codec: {type_name}")]
    UnsupportedType { type_name: &'static str },

    #[error("malformed encoded value: {raw:?}")]
    Malformed { raw: String },

    #[error("unknown type prefix in encoded value: {raw:?}")]
    UnknownPrefix { raw: String },
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("a batch is already open on this engine")]
    BatchAlreadyOpen,

    #[error("no batch is open on this engine")]
    NoBatchOpen,

    #[error("handle for {node_type}/{key} was already deleted")]
    NodeAlreadyDeleted { node_type: String, key: String },

    #[error("relationship {rel_type}/{rel_key} was already deleted")]
    RelationshipAlreadyDeleted { rel_type: String, rel_key: String },

    #[error("invalid component {component:?}: {reason}")]
    InvalidComponent { component: String, reason: &'static str },
}

impl Error {
    pub fn backend_failure(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::BackendFailure { source: Box::new(source) }
    }
}
