//! Error taxonomy for the feed export pipeline.
//!
//! Failures are isolated to row or feed-type granularity:
//! - [`MappingError`] drops a single row; the page carries on.
//! - [`FeedError`] aborts one feed type and is persisted as its error status.
//! - [`StateError`] is logged by callers and never fails the business operation.
//!
//! A disabled feed type is not an error at all; see [`crate::runner::RunOutcome::Disabled`].

use std::error::Error as StdError;

/// Boxed error returned by external collaborators (catalog, transport, state backend).
pub type CollaboratorError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure that aborts the run of one feed type.
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("unknown feed type: {0}")]
    UnknownFeedType(String),

    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("{context}: {source}")]
    DataLoad {
        context: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: CollaboratorError,
    },
}

impl FeedError {
    pub fn data_load(context: impl Into<String>, source: CollaboratorError) -> Self {
        Self::DataLoad {
            context: context.into(),
            source,
        }
    }

    pub fn transport(context: impl Into<String>, source: CollaboratorError) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }
}

/// Failure while turning one entity into a feed row.
#[derive(thiserror::Error, Debug)]
pub enum MappingError {
    #[error("could not load children of product {product_id}: {source}")]
    Children {
        product_id: u64,
        #[source]
        source: CollaboratorError,
    },

    #[error("could not decode attribute '{attribute}': {message}")]
    Decode { attribute: String, message: String },

    #[error("could not serialise row: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("mapper for {expected} feed received a {actual} entity")]
    WrongEntity {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Failure reading or writing persisted run state.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("state io error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state value '{key}' is not valid json: {source}")]
    Format {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state backend error: {0}")]
    Backend(String),
}

impl StateError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    pub fn format(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Format {
            key: key.into(),
            source,
        }
    }
}
