//! ragguard CLI - command-line interface for the guarded chat pipeline
//!
//! `ask` and `eval` go through every guard; `chat` is the unguarded
//! streaming path straight to the model.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use ragguard_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, ChatRequest,
    MetadataFilter, RagGuardConfig,
};
use ragguard_rag::{
    load_dataset, run_dataset, CompletionClient, EvalOutcome, GuardedPipeline, SiumaiBackend,
};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "ragguard")]
#[command(about = "Guarded retrieval-augmented chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question through the guarded pipeline
    Ask {
        /// Question to ask
        question: String,

        /// Metadata constraint on retrieved chunks (key=value, repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },

    /// Interactive streaming chat with the model (no guards, no retrieval)
    Chat,

    /// Run an evaluation dataset through the guarded pipeline
    Eval {
        /// Dataset file: JSON array of {question, expected_answer, evaluation_criteria}
        dataset: PathBuf,

        #[arg(long, default_value = "rag-eval-v1")]
        dataset_name: String,

        #[arg(long, default_value = "rag-eval-run-v1")]
        run_name: String,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = load_config(cli.config.as_deref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting ragguard CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ask { question, filters } => handle_ask(question, &filters, &config).await,
        Commands::Chat => handle_chat(&config).await,
        Commands::Eval {
            dataset,
            dataset_name,
            run_name,
            output,
        } => handle_eval(&dataset, &dataset_name, &run_name, output.as_deref(), &config).await,
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(show, init, validate, cli.config.as_deref()),
    }
}

/// Candidate configuration files, in lookup order
fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|d| d.join("ragguard").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".ragguard").join("config.toml")),
        Some(PathBuf::from("ragguard.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn load_config(config_path: Option<&Path>) -> Result<RagGuardConfig> {
    if let Some(path) = config_path {
        return RagGuardConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    for path in default_config_paths() {
        if path.exists() {
            return RagGuardConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()));
        }
    }

    Ok(RagGuardConfig::default())
}

/// Parse `key=value` filter arguments; values that are valid JSON keep their type
fn parse_filters(filters: &[String]) -> Result<Option<MetadataFilter>> {
    if filters.is_empty() {
        return Ok(None);
    }

    let mut parsed = MetadataFilter::new();
    for filter in filters {
        let Some((key, value)) = filter.split_once('=') else {
            bail!("Invalid filter '{}', expected key=value", filter);
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        parsed.insert(key.trim().to_string(), value);
    }
    Ok(Some(parsed))
}

async fn build_pipeline(config: &RagGuardConfig) -> Result<GuardedPipeline> {
    config.validate().context("Invalid configuration")?;
    GuardedPipeline::from_config(config).await.map_err(|e| {
        log_operation_error!("build_pipeline", e);
        anyhow::anyhow!(
            "Failed to create pipeline: {}. Check that an LLM API key is configured \
             (GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, ...)",
            e
        )
    })
}

async fn handle_ask(question: String, filters: &[String], config: &RagGuardConfig) -> Result<()> {
    let mut request = ChatRequest::new(question);
    request.metadata_filter = parse_filters(filters)?;

    let pipeline = build_pipeline(config).await?;

    match pipeline.handle(&request).await {
        Ok(response) => {
            println!("{}", response.answer);
            println!();
            println!("Confidence: {:.2}", response.confidence);
            if !response.sources.is_empty() {
                println!("Sources:");
                for source in &response.sources {
                    println!("  - {}", source);
                }
            }
            if !response.follow_up_questions.is_empty() {
                println!("Follow-up questions:");
                for question in &response.follow_up_questions {
                    println!("  - {}", question);
                }
            }
            Ok(())
        }
        Err(e) => bail!("[{}] {}", e.code(), e.public_message()),
    }
}

async fn handle_chat(config: &RagGuardConfig) -> Result<()> {
    log_operation_start!("chat_mode");

    let backend = SiumaiBackend::new(config.llm.clone())
        .await
        .context("Failed to create LLM client")?;
    let client = CompletionClient::new(Arc::new(backend), config.llm.timeout_ms);

    println!("Chatting with {} (type 'exit' to quit)", client.model_name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turns = 0usize;

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message == "exit" {
            break;
        }
        if message.is_empty() {
            continue;
        }

        print!("AI: ");
        std::io::stdout().flush()?;

        let mut stream = match client.stream_complete(message).await {
            Ok(stream) => stream,
            Err(e) => {
                println!("[{}]", e);
                continue;
            }
        };
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                }
                Err(e) => {
                    print!("\n[stream interrupted: {}]", e);
                    break;
                }
            }
        }
        println!();
        turns += 1;
    }

    log_operation_success!("chat_mode", turns = turns);
    Ok(())
}

async fn handle_eval(
    dataset: &Path,
    dataset_name: &str,
    run_name: &str,
    output: Option<&Path>,
    config: &RagGuardConfig,
) -> Result<()> {
    let items = load_dataset(dataset)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let pipeline = build_pipeline(config).await?;

    println!(
        "Running {} items from '{}' as '{}'",
        items.len(),
        dataset_name,
        run_name
    );

    let report = run_dataset(&pipeline, dataset_name, run_name, &items).await;

    for (i, item) in report.items.iter().enumerate() {
        println!("[{}] {}", i + 1, item.question);
        match &item.outcome {
            EvalOutcome::Responded {
                answer_preview,
                confidence,
            } => println!("    answer ({:.2}): {}...", confidence, answer_preview),
            EvalOutcome::Rejected { code } => println!("    rejected: {}", code),
            EvalOutcome::Failed { code } => println!("    failed: {}", code),
        }
    }

    println!(
        "\nResponded: {}  Rejected: {}  Failed: {}",
        report.responded, report.rejected, report.failed
    );

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn handle_config(show: bool, init: bool, validate: bool, config_path: Option<&Path>) -> Result<()> {
    if init {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => default_config_paths()
                .into_iter()
                .next()
                .context("Could not determine a configuration directory")?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        RagGuardConfig::default().save_to_file(&path)?;
        println!("Configuration initialized at: {}", path.display());
        println!("Edit the file to set the provider, corpus path and tracing sink.");
    }

    if show {
        let config = load_config(config_path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        let config = load_config(config_path)?;
        config.validate().context("Configuration validation failed")?;
        println!("Configuration is valid");
    }

    Ok(())
}
