//! Extract command - pull entities out of a single document.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use dexr_core::{
    CancelToken, Credentials, ErrorKind, ExtractError, Extraction, ExtractionRecord,
    ExtractionRequest, ImagePayload, MediaKind, Orchestrator, ProviderChoice, ProviderKind,
    RequestedType,
};

use super::{load_config, open_store};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input document (PNG, JPEG, GIF, BMP, WebP or PDF)
    #[arg(required = true)]
    input: PathBuf,

    /// Document type
    #[arg(short = 't', long = "type", default_value = "auto", value_parser = parse_requested_type)]
    doc_type: RequestedType,

    /// AI provider (openai, gemini)
    #[arg(short, long, default_value = "openai", value_parser = parse_provider)]
    provider: ProviderKind,

    /// Model identifier (default: the provider's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// API key (falls back to OPENAI_API_KEY, or GOOGLE_API_KEY/GEMINI_API_KEY for gemini)
    #[arg(long)]
    api_key: Option<String>,

    /// Save the record to the local store
    #[arg(long)]
    save: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Show statistics about the raw model answer
    #[arg(long)]
    stats: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON record
    Json,
    /// Field/value CSV
    Csv,
    /// Plain text summary
    Text,
}

fn parse_requested_type(s: &str) -> Result<RequestedType, String> {
    s.parse().map_err(|e: dexr_core::ValidationError| e.to_string())
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    ProviderChoice::parse_kind(s).map_err(|e| e.to_string())
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let image = read_document(&args.input)?;
    info!("Processing file: {} ({})", args.input.display(), image.kind());

    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.provider(args.provider).default_model.clone());

    let api_key = resolve_api_key(args.api_key.as_deref(), args.provider).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key for {}. Pass --api-key or set {}.",
            args.provider,
            key_env_vars(args.provider).join(" or ")
        )
    })?;

    let request = ExtractionRequest::new(
        args.doc_type,
        image,
        ProviderChoice::new(args.provider, model),
        Credentials::new(api_key),
    );

    let orchestrator = Orchestrator::new(config.clone())?;

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!(
        "Extracting with {} {}...",
        args.provider, request.provider.model
    ));

    let result = if args.save {
        let store = open_store(&config).await?;
        orchestrator.extract_and_save(&request, &store, &cancel).await
    } else {
        orchestrator.extract_with_cancel(&request, &cancel).await
    };

    pb.finish_and_clear();

    let (extraction, save_error) = match result {
        Ok(extraction) => (extraction, None),
        Err(ExtractError::Persistence { extraction, source }) => (*extraction, Some(source)),
        Err(err) => return Err(explain(err)),
    };

    let output = format_record(&extraction.record, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    report(&extraction, args.stats);

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(source) = save_error {
        anyhow::bail!(
            "Extraction {} succeeded but could not be saved: {}",
            extraction.record.id(),
            source
        );
    }

    if args.save {
        eprintln!(
            "{} Saved record {}",
            style("✓").green(),
            extraction.record.id()
        );
    }

    Ok(())
}

/// Read a document, detecting its kind from content or extension.
fn read_document(path: &Path) -> anyhow::Result<ImagePayload> {
    let bytes = fs::read(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let kind = MediaKind::sniff(&bytes)
        .or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(MediaKind::from_extension)
        })
        .ok_or_else(|| anyhow::anyhow!("Unsupported file format: {}", path.display()))?;

    Ok(ImagePayload::new(bytes, kind, file_name))
}

fn key_env_vars(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::OpenAi => &["OPENAI_API_KEY"],
        ProviderKind::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
    }
}

fn resolve_api_key(explicit: Option<&str>, provider: ProviderKind) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| {
            key_env_vars(provider)
                .iter()
                .find_map(|var| std::env::var(var).ok())
        })
        .filter(|key| !key.trim().is_empty())
}

/// Attach user-facing guidance to a failed extraction.
fn explain(err: ExtractError) -> anyhow::Error {
    match err.kind() {
        ErrorKind::Auth => {
            eprintln!(
                "{} The provider rejected the API key. Check that it is valid and has access to the model.",
                style("✗").red()
            );
        }
        ErrorKind::TransientProvider => {
            eprintln!(
                "{} The provider is busy or unreachable. Wait a moment and try again.",
                style("↻").yellow()
            );
        }
        ErrorKind::Cancelled => {
            eprintln!("{} Cancelled.", style("ℹ").blue());
        }
        _ => {}
    }
    err.into()
}

/// Print warnings, caveats and optional stats to stderr.
fn report(extraction: &Extraction, show_stats: bool) {
    let record = &extraction.record;

    if extraction.is_degraded() {
        eprintln!(
            "{} The model did not return structured data; the raw answer is shown under `raw_text`.",
            style("⚠").yellow()
        );
    }

    for warning in &extraction.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }

    let missing = record.missing_fields();
    if !missing.is_empty() && !extraction.is_degraded() {
        eprintln!(
            "{} Not found in document: {}",
            style("ℹ").blue(),
            missing.join(", ")
        );
    }

    if show_stats {
        let stats = record.stats();
        eprintln!();
        eprintln!(
            "{} {} characters, {} words, {} lines in model answer",
            style("ℹ").blue(),
            stats.characters,
            stats.words,
            stats.lines
        );
    }
}

fn format_record(record: &ExtractionRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Csv => format_csv(record),
        OutputFormat::Text => Ok(format_text(record)),
    }
}

#[derive(Serialize)]
struct FieldRow<'a> {
    field: &'a str,
    value: String,
}

pub(crate) fn format_csv(record: &ExtractionRecord) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    for (field, value) in record.entities() {
        wtr.serialize(FieldRow {
            field,
            value: display_value(value),
        })?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

pub(crate) fn format_text(record: &ExtractionRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", record.document_type()));
    output.push_str(&format!("File: {}\n", record.file_name()));
    output.push_str(&format!(
        "Model: {} ({})\n",
        record.model_used(),
        record.provider()
    ));
    output.push_str(&format!(
        "Extracted: {}\n",
        record.uploaded_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("ID: {}\n", record.id()));
    output.push('\n');

    let width = record.entities().keys().map(|k| k.len()).max().unwrap_or(0);
    for (field, value) in record.entities() {
        match value {
            Value::Array(_) | Value::Object(_) => {
                output.push_str(&format!("{}:\n", field));
                let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
                for line in pretty.lines() {
                    output.push_str(&format!("  {}\n", line));
                }
            }
            _ => {
                output.push_str(&format!(
                    "{:<width$}  {}\n",
                    field,
                    display_value(value),
                    width = width
                ));
            }
        }
    }

    output
}

/// Strings unquoted, null as N/A, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ExtractionRecord {
        let Value::Object(entities) = json!({
            "invoice_number": "INV-001",
            "tax": null,
            "line_items": [{"description": "Widget", "qty": 2}],
            "total": 100.5
        }) else {
            unreachable!()
        };
        ExtractionRecord::new(
            dexr_core::DocumentType::Invoice,
            entities,
            "{}",
            "inv.png",
            "gpt-4o",
            ProviderKind::OpenAi,
            "v1",
        )
    }

    #[test]
    fn test_format_csv() {
        let csv = format_csv(&record()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("field,value"));
        assert!(csv.contains("invoice_number,INV-001"));
        assert!(csv.contains("tax,N/A"));
        assert!(csv.contains("total,100.5"));
    }

    #[test]
    fn test_format_text() {
        let text = format_text(&record());
        assert!(text.starts_with("Document: Invoice\n"));
        assert!(text.contains("Model: gpt-4o (OpenAI)"));
        assert!(text.contains("line_items:\n"));
        assert!(text.contains("\"description\": \"Widget\""));
    }

    #[test]
    fn test_resolve_api_key_prefers_explicit() {
        assert_eq!(
            resolve_api_key(Some("sk-explicit-123456"), ProviderKind::OpenAi),
            Some("sk-explicit-123456".to_string())
        );
        assert_eq!(resolve_api_key(Some("   "), ProviderKind::Gemini), None);
    }

    #[test]
    fn test_key_env_vars_per_provider() {
        assert_eq!(key_env_vars(ProviderKind::OpenAi), ["OPENAI_API_KEY"]);
        assert_eq!(
            key_env_vars(ProviderKind::Gemini),
            ["GOOGLE_API_KEY", "GEMINI_API_KEY"]
        );
        assert!(parse_provider("anthropic").is_err());
    }

    #[test]
    fn test_parse_requested_type() {
        assert_eq!(parse_requested_type("auto"), Ok(RequestedType::Auto));
        assert!(parse_requested_type("passport").is_err());
    }
}
