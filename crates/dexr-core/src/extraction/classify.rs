//! Mapping of auto-detect answers to document types.

use crate::models::document::DocumentType;

/// Map a model's classification answer to a document type.
///
/// The first recognizable keyword wins. Answers that name no known type
/// resolve to [`DocumentType::General`].
pub fn classify_answer(answer: &str) -> DocumentType {
    let lowered = answer.to_lowercase();

    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .find_map(keyword)
        .unwrap_or(DocumentType::General)
}

fn keyword(word: &str) -> Option<DocumentType> {
    match word {
        "invoice" | "invoices" | "bill" => Some(DocumentType::Invoice),
        "receipt" | "receipts" => Some(DocumentType::Receipt),
        "email" | "e-mail" | "emails" => Some(DocumentType::Email),
        "general" => Some(DocumentType::General),
        _ => None,
    }
}
