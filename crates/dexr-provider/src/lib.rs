//! Hosted vision-model adapters for dexr.
//!
//! This crate provides a single submission contract over the hosted
//! multimodal APIs the extractor can talk to:
//! - OpenAI chat completions with inline image parts
//! - Google Gemini `generateContent` with inline data parts

mod backend;
mod credentials;
mod error;
mod payload;

pub use backend::gemini::GeminiProvider;
pub use backend::openai::OpenAiProvider;
pub use backend::{HostedProvider, ProviderKind, RawResponse, VisionProvider};
pub use credentials::Credentials;
pub use error::ProviderError;
pub use payload::{ImagePayload, MediaKind};

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
