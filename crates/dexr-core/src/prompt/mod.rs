//! Extraction prompt templates.
//!
//! Each document type has a fixed list of fields the model is asked for.
//! Templates are versioned so stored records can be traced back to the
//! instructions that produced them.

use std::fmt::Write as _;

use serde::Serialize;

use crate::models::document::DocumentType;

/// Version tag stamped on every template and record.
pub const PROMPT_VERSION: &str = "2024-06.1";

/// One field the model is asked to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Key expected in the JSON answer.
    pub key: &'static str,
    /// Short description shown to the model.
    pub hint: &'static str,
}

const fn field(key: &'static str, hint: &'static str) -> FieldSpec {
    FieldSpec { key, hint }
}

const INVOICE_FIELDS: &[FieldSpec] = &[
    field("invoice_number", "invoice number or identifier"),
    field("date", "issue date"),
    field("due_date", "payment due date"),
    field("vendor", "vendor or supplier name"),
    field("vendor_address", "vendor address"),
    field("customer", "customer or buyer name"),
    field("customer_address", "customer billing or shipping address"),
    field("line_items", "array of {description, quantity, unit_price, total}"),
    field("subtotal", "amount before tax"),
    field("tax", "tax amount"),
    field("tax_rate", "tax rate"),
    field("discount", "discount, if any"),
    field("total", "total amount due"),
    field("currency", "currency code or symbol"),
    field("payment_terms", "payment terms"),
    field("purchase_order_number", "purchase order number, if any"),
];

const RECEIPT_FIELDS: &[FieldSpec] = &[
    field("merchant", "store or merchant name"),
    field("merchant_address", "store address"),
    field("merchant_contact", "store phone, email or website"),
    field("receipt_number", "receipt number or transaction id"),
    field("date", "purchase date"),
    field("time", "purchase time"),
    field("cashier", "cashier or server name, if any"),
    field("items", "array of {description, quantity, price}"),
    field("subtotal", "amount before tax"),
    field("tax", "tax amount"),
    field("total", "total paid"),
    field("payment_method", "cash, card, etc."),
    field("card_last_four", "last four card digits, if shown"),
    field("change_given", "change given, if any"),
    field("return_policy", "return policy text"),
];

const EMAIL_FIELDS: &[FieldSpec] = &[
    field("from", "sender name and address"),
    field("to", "recipient names and addresses"),
    field("cc", "carbon copy recipients"),
    field("bcc", "blind carbon copy recipients, if visible"),
    field("date", "sent date and time"),
    field("subject", "subject line"),
    field("body", "message body"),
    field("attachments", "attachments mentioned"),
    field("signature", "signature block"),
    field("contact_information", "phone numbers, addresses and similar"),
    field("links", "URLs in the message"),
    field("action_items", "requests or tasks for the reader"),
    field("deadlines", "key dates or deadlines"),
];

const GENERAL_FIELDS: &[FieldSpec] = &[
    field("title", "document title or kind"),
    field("date", "document date"),
    field("author", "sender or author"),
    field("recipient", "recipient"),
    field("entities", "names, organizations and locations"),
    field("amounts", "monetary amounts"),
    field("reference_numbers", "reference or account numbers"),
    field("summary", "short summary of the content"),
];

/// A rendered, versioned instruction text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub document_type: DocumentType,
    pub version: &'static str,
    pub text: String,
}

/// Builds extraction and classification prompts.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Fields expected for a document type.
    ///
    /// For [`DocumentType::General`] these are suggestions only.
    pub fn fields(doc_type: DocumentType) -> &'static [FieldSpec] {
        match doc_type {
            DocumentType::Invoice => INVOICE_FIELDS,
            DocumentType::Receipt => RECEIPT_FIELDS,
            DocumentType::Email => EMAIL_FIELDS,
            DocumentType::General => GENERAL_FIELDS,
        }
    }

    /// Render the extraction prompt for a document type.
    pub fn build(doc_type: DocumentType) -> PromptTemplate {
        let mut text = String::new();

        let _ = writeln!(
            text,
            "You are an expert document analyzer. Extract the entities from the attached {} image.",
            doc_type.label().to_lowercase()
        );
        text.push('\n');

        match doc_type {
            DocumentType::General => {
                text.push_str(
                    "Identify every salient entity in the document and choose a short \
                     snake_case key for each one. The following keys are suggestions:\n",
                );
            }
            _ => {
                text.push_str("Return exactly these keys:\n");
            }
        }

        for spec in Self::fields(doc_type) {
            let _ = writeln!(text, "- {}: {}", spec.key, spec.hint);
        }

        text.push('\n');
        text.push_str(
            "Respond with a single JSON object and nothing else. No prose, no markdown.\n\
             Use null for any field that is not present in the document.\n\
             Keep amounts, dates and identifiers exactly as printed.\n",
        );

        PromptTemplate {
            document_type: doc_type,
            version: PROMPT_VERSION,
            text,
        }
    }

    /// Prompt for the auto-detect sub-request.
    pub fn classification() -> String {
        let choices: Vec<&str> = DocumentType::ALL.iter().map(|t| t.as_str()).collect();
        format!(
            "Look at the attached document image and decide what kind of document it is.\n\
             Answer with exactly one word from this list: {}.\n\
             If none fits, answer general.",
            choices.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_is_deterministic() {
        for doc_type in DocumentType::ALL {
            assert_eq!(PromptBuilder::build(doc_type), PromptBuilder::build(doc_type));
        }
    }

    #[test]
    fn test_invoice_prompt_lists_fields() {
        let template = PromptBuilder::build(DocumentType::Invoice);
        assert_eq!(template.version, PROMPT_VERSION);
        assert_eq!(template.document_type, DocumentType::Invoice);

        for spec in PromptBuilder::fields(DocumentType::Invoice) {
            assert!(template.text.contains(spec.key), "missing {}", spec.key);
        }
        assert!(template.text.contains("null"));
        assert!(template.text.contains("JSON object"));
    }

    #[test]
    fn test_general_prompt_is_open_ended() {
        let template = PromptBuilder::build(DocumentType::General);
        assert!(template.text.contains("suggestions"));
        assert!(!template.text.contains("Return exactly these keys"));
    }

    #[test]
    fn test_field_keys_are_unique() {
        for doc_type in DocumentType::ALL {
            let fields = PromptBuilder::fields(doc_type);
            let mut keys: Vec<_> = fields.iter().map(|f| f.key).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), fields.len(), "{doc_type:?}");
        }
    }

    #[test]
    fn test_classification_prompt_names_every_type() {
        let prompt = PromptBuilder::classification();
        for doc_type in DocumentType::ALL {
            assert!(prompt.contains(doc_type.as_str()));
        }
    }
}
