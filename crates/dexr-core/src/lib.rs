//! Core library for document entity extraction.
//!
//! This crate provides:
//! - Document types and the extraction record model
//! - Versioned prompt templates per document type
//! - Tolerant parsing of free-form model answers into entity maps
//! - The extraction orchestrator (validation, type detection, retries, cancellation)
//! - Record stores (in-memory and JSON files on disk)

pub mod error;
pub mod extraction;
pub mod models;
pub mod prompt;
pub mod store;

pub use error::{ErrorKind, ExtractError, Result, StoreError, ValidationError};
pub use extraction::{
    CancelToken, Extraction, ExtractionRequest, Orchestrator, ParseStatus, ParsedResponse,
    ProviderChoice, ResponseParser, Stage, classify_answer,
};
pub use models::config::{DexrConfig, ProviderSettings, ProvidersConfig, RetryConfig, StoreConfig};
pub use models::document::{DocumentType, RequestedType};
pub use models::record::{EntityMap, ExtractionRecord, TextStats};
pub use prompt::{FieldSpec, PROMPT_VERSION, PromptBuilder, PromptTemplate};
pub use store::{FieldQuery, JsonFileStore, MemoryStore, RecordFilter, RecordStore, SearchHit};

/// Re-export provider types.
pub use dexr_provider::{
    Credentials, HostedProvider, ImagePayload, MediaKind, ProviderError, ProviderKind,
    RawResponse, VisionProvider,
};
