//! Records command - browse and search saved extractions.

use chrono::Local;
use clap::{Args, Subcommand, ValueEnum};
use console::style;
use uuid::Uuid;

use dexr_core::{DocumentType, FieldQuery, RecordFilter, RecordStore};

use super::{load_config, open_store, store_dir};

/// Arguments for the records command.
#[derive(Args)]
pub struct RecordsArgs {
    #[command(subcommand)]
    command: RecordsCommand,
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// List saved records, newest first
    List(ListArgs),

    /// Find records whose entities contain a field
    Search(SearchArgs),

    /// Show one record
    Show {
        /// Record id
        id: Uuid,
    },
}

#[derive(Args)]
struct ListArgs {
    /// Only records of this document type
    #[arg(short = 't', long = "type", value_parser = parse_document_type)]
    doc_type: Option<DocumentType>,

    /// Maximum number of records
    #[arg(short, long)]
    limit: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: ListFormat,
}

#[derive(Args)]
struct SearchArgs {
    /// Entity key, e.g. "invoice_number"
    key: String,

    /// Only records where the field equals this text
    #[arg(short, long)]
    equals: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ListFormat {
    /// Human-readable table
    Table,
    /// JSON array of records
    Json,
}

fn parse_document_type(s: &str) -> Result<DocumentType, String> {
    s.parse().map_err(|e: dexr_core::ValidationError| e.to_string())
}

pub async fn run(args: RecordsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    match args.command {
        RecordsCommand::List(list_args) => {
            let filter = RecordFilter {
                document_type: list_args.doc_type,
                limit: list_args.limit,
            };
            let records = store.list(&filter).await?;

            if records.is_empty() {
                println!(
                    "{} No records found in {}",
                    style("ℹ").blue(),
                    store_dir(&config).display()
                );
                return Ok(());
            }

            match list_args.format {
                ListFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                ListFormat::Table => {
                    println!(
                        "{}",
                        style(format!(
                            "{:<36}  {:<18}  {:<16}  {:<20}  {}",
                            "ID", "TYPE", "UPLOADED", "MODEL", "FILE"
                        ))
                        .bold()
                    );
                    for record in &records {
                        println!(
                            "{:<36}  {:<18}  {:<16}  {:<20}  {}",
                            record.id(),
                            record.document_type(),
                            record
                                .uploaded_at()
                                .with_timezone(&Local)
                                .format("%Y-%m-%d %H:%M"),
                            record.model_used(),
                            record.file_name()
                        );
                    }
                    println!();
                    println!("{} record(s)", records.len());
                }
            }
        }

        RecordsCommand::Search(search_args) => {
            let query = FieldQuery {
                key: search_args.key,
                equals: search_args.equals,
            };
            let hits = store.search(&query).await?;

            if hits.is_empty() {
                println!("{} No records contain `{}`", style("ℹ").blue(), query.key);
                return Ok(());
            }

            for hit in &hits {
                println!(
                    "{}  {:<18}  {}  {} = {}",
                    hit.id,
                    hit.document_type,
                    hit.uploaded_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    style(&query.key).cyan(),
                    hit.value
                );
            }
        }

        RecordsCommand::Show { id } => {
            let record = store
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No record with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
