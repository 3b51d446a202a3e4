//! Document type taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A concrete document category.
///
/// Completed records always carry one of these; auto-detection is expressed
/// separately by [`RequestedType::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    Email,
    /// Any other document; the model labels the entities itself.
    General,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Invoice,
        DocumentType::Receipt,
        DocumentType::Email,
        DocumentType::General,
    ];

    /// Stable identifier used in storage and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Email => "email",
            DocumentType::General => "general",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::Receipt => "Receipt",
            DocumentType::Email => "Email",
            DocumentType::General => "General Document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<RequestedType>()? {
            RequestedType::Known(doc_type) => Ok(doc_type),
            RequestedType::Auto => Err(ValidationError::UnsupportedDocumentType(s.to_string())),
        }
    }
}

/// The document type a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestedType {
    /// Let the model decide before extracting.
    #[default]
    Auto,
    Known(DocumentType),
}

impl From<DocumentType> for RequestedType {
    fn from(doc_type: DocumentType) -> Self {
        RequestedType::Known(doc_type)
    }
}

impl fmt::Display for RequestedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedType::Auto => f.pad("Auto-detect"),
            RequestedType::Known(doc_type) => fmt::Display::fmt(doc_type, f),
        }
    }
}

impl FromStr for RequestedType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', " ");
        let requested = match normalized.as_str() {
            "auto" | "auto-detect" | "auto detect" | "autodetect" => RequestedType::Auto,
            "invoice" => DocumentType::Invoice.into(),
            "receipt" => DocumentType::Receipt.into(),
            "email" | "e-mail" => DocumentType::Email.into(),
            "general" | "general document" | "document" => DocumentType::General.into(),
            _ => return Err(ValidationError::UnsupportedDocumentType(s.to_string())),
        };
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_requested_type() {
        assert_eq!("Invoice".parse::<RequestedType>(), Ok(DocumentType::Invoice.into()));
        assert_eq!(" E-Mail ".parse::<RequestedType>(), Ok(DocumentType::Email.into()));
        assert_eq!("General Document".parse::<RequestedType>(), Ok(DocumentType::General.into()));
        assert_eq!("Auto-detect".parse::<RequestedType>(), Ok(RequestedType::Auto));
        assert_eq!(
            "passport".parse::<RequestedType>(),
            Err(ValidationError::UnsupportedDocumentType("passport".to_string()))
        );
    }

    #[test]
    fn test_document_type_rejects_auto() {
        assert!("auto".parse::<DocumentType>().is_err());
        assert_eq!("receipt".parse::<DocumentType>(), Ok(DocumentType::Receipt));
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(serde_json::to_string(&DocumentType::General).unwrap(), "\"general\"");
        let parsed: DocumentType = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(parsed, DocumentType::Email);
        assert!(serde_json::from_str::<DocumentType>("\"auto\"").is_err());
    }
}
