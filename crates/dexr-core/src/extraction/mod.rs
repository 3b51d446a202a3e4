//! Entity extraction pipeline.

mod cancel;
mod classify;
mod orchestrator;
mod parser;

pub use cancel::CancelToken;
pub use classify::classify_answer;
pub use orchestrator::Orchestrator;
pub use parser::{ITEMS_KEY, ParseStatus, ParsedResponse, RAW_TEXT_KEY, ResponseParser};

use std::fmt;

use dexr_provider::{Credentials, ImagePayload, ProviderKind};
use serde::Serialize;

use crate::error::ValidationError;
use crate::models::document::RequestedType;
use crate::models::record::ExtractionRecord;

/// Provider and model selected for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChoice {
    pub kind: ProviderKind,
    pub model: String,
}

impl ProviderChoice {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
        }
    }

    /// Parse a provider name as given on the command line or in a request.
    pub fn parse_kind(name: &str) -> Result<ProviderKind, ValidationError> {
        name.parse()
            .map_err(|_| ValidationError::UnsupportedProvider(name.trim().to_string()))
    }
}

/// Everything needed for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub requested_type: RequestedType,
    pub image: ImagePayload,
    pub provider: ProviderChoice,
    pub credentials: Credentials,
}

impl ExtractionRequest {
    pub fn new(
        requested_type: impl Into<RequestedType>,
        image: ImagePayload,
        provider: ProviderChoice,
        credentials: Credentials,
    ) -> Self {
        Self {
            requested_type: requested_type.into(),
            image,
            provider,
            credentials,
        }
    }
}

/// Pipeline stage of a single extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    TypeResolved,
    Submitted,
    Parsed,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::TypeResolved => "type_resolved",
            Stage::Submitted => "submitted",
            Stage::Parsed => "parsed",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub record: ExtractionRecord,
    pub parse: ParseStatus,
    /// Non-fatal issues worth showing to the user.
    pub warnings: Vec<String>,
}

impl Extraction {
    /// Whether the entities are only the raw answer text.
    pub fn is_degraded(&self) -> bool {
        self.parse == ParseStatus::Degraded
    }
}
