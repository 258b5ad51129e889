use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taiasst::catalog::ModelCache;
use taiasst::config::{Config, DEFAULT_CONFIG_PATH};
use taiasst::llm::{LLMError, Provider, create_client, validate_configuration};
use taiasst::session::{ChatHistory, ChatObserver, ChatOrchestrator, ChatTurn, DEFAULT_TITLE};
use taiasst::store::{CredentialStore, FileSettingsStore};

#[derive(Parser)]
#[command(name = "taiasst")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a model. Reads prompts from stdin when none is given.
    Chat {
        #[arg(short, long)]
        provider: Option<Provider>,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        prompt: Option<String>,
    },

    /// List available models.
    Models {
        #[arg(short, long)]
        provider: Option<Provider>,
    },

    /// Check that a provider's credentials are accepted.
    Check { provider: Provider },
}

/// Streams model output to stdout.
struct StdoutObserver;

impl ChatObserver for StdoutObserver {
    fn on_chunk(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn on_complete(&mut self, _turn: &ChatTurn) {
        println!();
    }

    fn on_error(&mut self, _error: &LLMError) {
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Chat {
            provider,
            model,
            temperature,
            max_tokens,
            prompt,
        } => {
            chat(config, provider, model, temperature, max_tokens, prompt).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Models { provider } => {
            let cache = ModelCache::new(Arc::new(config.catalog()));
            for model in cache.refresh().await.iter() {
                if provider.is_some_and(|p| p != model.provider) {
                    continue;
                }
                let mut flags = Vec::new();
                if model.capabilities.manual_decode_path {
                    flags.push("reasoning");
                }
                if model.configured {
                    flags.push("configured");
                }
                println!(
                    "{:<10} {:<28} {:<20} {}",
                    model.provider,
                    model.model_id,
                    model.name,
                    flags.join(",")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { provider } => {
            let credentials = config.credentials(provider).await.unwrap_or_default();
            let client = create_client(
                provider.as_str(),
                credentials.api_key.as_deref().unwrap_or_default(),
                credentials.base_url.as_deref(),
            )?;
            info!(
                provider = provider.display_name(),
                base_url = client.base_url(),
                "Checking provider configuration"
            );
            if validate_configuration(&client).await {
                println!("ok");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("invalid");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn chat(
    config: Config,
    provider: Option<Provider>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    prompt: Option<String>,
) -> Result<()> {
    let cache = ModelCache::new(Arc::new(config.catalog()));
    cache.refresh().await;

    let mut options = config.completion_options();
    if let Some(provider) = provider {
        options.provider = Some(provider);
        options.model = match model {
            Some(model) => Some(model),
            None => cache.first_model_for(provider).map(|m| m.model_id),
        };
    } else if model.is_some() {
        options.model = model;
    }
    options.temperature = temperature.or(options.temperature);
    options.max_tokens = max_tokens.or(options.max_tokens);

    let mut history = ChatHistory::new(DEFAULT_TITLE, config.system_prompt.clone(), options);
    let settings = Arc::new(FileSettingsStore::new(config.settings_path.clone()));
    let orchestrator = ChatOrchestrator::new(Arc::new(config), settings, cache);
    let mut observer = StdoutObserver;

    if let Some(prompt) = prompt {
        orchestrator.send(&mut history, &prompt, &mut observer).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }
        if let Err(e) = orchestrator.send(&mut history, line, &mut observer).await {
            eprintln!("error: {e}");
        }
    }

    info!(chat = %history.id, title = %history.title, turns = history.turns.len(), "Chat ended");
    Ok(())
}
