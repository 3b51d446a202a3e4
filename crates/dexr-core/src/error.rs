//! Error types for the dexr-core library.

use std::fmt;
use std::path::PathBuf;

use dexr_provider::{ProviderError, ProviderKind};
use thiserror::Error;

use crate::extraction::Extraction;

/// Main error type for an extraction call.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The request was rejected before any provider call.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(#[source] ProviderError),

    /// A transient provider failure persisted after all retries.
    #[error("provider failed after {attempts} attempt(s): {source}")]
    TransientProvider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The provider refused the request permanently.
    #[error("provider rejected the request: {0}")]
    Provider(#[source] ProviderError),

    /// The caller cancelled the extraction.
    #[error("extraction cancelled")]
    Cancelled,

    /// Extraction succeeded but the record could not be saved.
    #[error("extraction {} succeeded but could not be saved: {source}", extraction.record.id())]
    Persistence {
        extraction: Box<Extraction>,
        #[source]
        source: StoreError,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Reasons a request is rejected up front.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The document payload has no bytes.
    #[error("document is empty")]
    EmptyPayload,

    /// The payload is not a supported image or PDF.
    #[error("unsupported file format: {file_name}")]
    UnsupportedMedia { file_name: String },

    /// The document type string is not recognized.
    #[error("unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    /// The provider name is not recognized.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The model is not in the catalogue for the provider.
    #[error("model `{model}` is not available for {provider}")]
    UnsupportedModel {
        provider: ProviderKind,
        model: String,
    },

    /// The credentials are missing or obviously malformed.
    #[error("missing or malformed API key for {provider}")]
    InvalidCredentials { provider: ProviderKind },
}

/// Errors raised by a record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row is unreadable.
    #[error("corrupt record at {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    /// The backing store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification of a failure, for callers deciding what to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    TransientProvider,
    ProviderRejected,
    /// Not an error value; reported through [`Extraction::is_degraded`].
    ParseDegraded,
    Cancelled,
    Persistence,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::TransientProvider => "transient provider",
            ErrorKind::ProviderRejected => "provider rejected",
            ErrorKind::ParseDegraded => "parse degraded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

impl ExtractError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Validation(_) => ErrorKind::Validation,
            ExtractError::Auth(_) => ErrorKind::Auth,
            ExtractError::TransientProvider { .. } => ErrorKind::TransientProvider,
            ExtractError::Provider(_) => ErrorKind::ProviderRejected,
            ExtractError::Cancelled => ErrorKind::Cancelled,
            ExtractError::Persistence { .. } => ErrorKind::Persistence,
            ExtractError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether trying again later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::TransientProvider { .. } | ExtractError::Persistence { .. }
        )
    }

    /// Map a final provider failure after `attempts` calls.
    pub(crate) fn from_provider(err: ProviderError, attempts: u32) -> Self {
        if err.is_auth() {
            ExtractError::Auth(err)
        } else if err.is_transient() {
            ExtractError::TransientProvider {
                attempts,
                source: err,
            }
        } else {
            ExtractError::Provider(err)
        }
    }
}

/// Result type for the dexr-core library.
pub type Result<T> = std::result::Result<T, ExtractError>;
