//! Models command - show which hosted models can be used.

use clap::{Args, Subcommand};
use console::style;

use dexr_core::{ProviderChoice, ProviderKind};

use super::load_config;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List available models
    List {
        /// Only this provider (openai, gemini)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,
    },
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    ProviderChoice::parse_kind(s).map_err(|e| e.to_string())
}

pub async fn run(args: ModelsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    match args.command {
        ModelsCommand::List { provider } => {
            println!("{}", style("Available Models").bold());
            println!();

            let kinds: Vec<ProviderKind> = match provider {
                Some(kind) => vec![kind],
                None => ProviderKind::ALL.to_vec(),
            };

            for kind in kinds {
                let settings = config.provider(kind);
                println!(
                    "{} {}",
                    style(format!("▸ {}", kind)).bold().cyan(),
                    style(format!("(--provider {})", kind.as_str())).dim()
                );

                for model in &settings.models {
                    let mut tags = Vec::new();
                    if *model == settings.default_model {
                        tags.push("default");
                    }
                    if settings.classification_model.as_deref() == Some(model.as_str()) {
                        tags.push("auto-detect");
                    }
                    let tags = if tags.is_empty() {
                        String::new()
                    } else {
                        format!("({})", tags.join(", "))
                    };

                    println!("    {:<24} {}", model, style(tags).green());
                }
                println!();
            }
        }
    }

    Ok(())
}
