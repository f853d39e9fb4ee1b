use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use figment::providers::Serialized;
use scribe::app::{AppError, StreamApp};
use scribe::input::{PromptInput, ResubmitPolicy};
use scribe::settings::SettingsStore;
use scribe::terminal::TerminalRegion;
use scribe_core::SubmissionController;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Streams a text generation response to the terminal.
///
/// Without `--prompt`, every line read from stdin is submitted as a prompt.
#[derive(Debug, Parser, Serialize)]
#[command(name = "scribe", version, about, long_about = None)]
struct Cli {
    /// Submit a single prompt and exit once the response concludes
    #[arg(short, long)]
    #[serde(skip)]
    prompt: Option<String>,

    /// Model name sent to the provider
    #[arg(short, long)]
    #[serde(rename = "model_name", skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,

    /// System preamble prepended to every request
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,

    /// Settings file, defaults to the platform config directory
    #[arg(short, long)]
    #[serde(skip)]
    config: Option<PathBuf>,

    /// Ignore new prompts until the current response concludes
    #[arg(long)]
    #[serde(skip)]
    wait: bool,

    /// Height of the scroll viewport in lines
    #[arg(long, default_value_t = 24)]
    #[serde(skip)]
    rows: usize,

    /// Persist the effective settings before running
    #[arg(long)]
    #[serde(skip)]
    save: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Generation { message, .. }) => {
            // Already shown in the output region.
            tracing::debug!(error = %message, "generation concluded with an error");
            ExitCode::FAILURE
        }
        Err(error) => {
            tracing::error!(error = %error, "scribe failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SettingsStore::default_config_path);
    let store = Arc::new(SettingsStore::with_overrides(
        config_path,
        Serialized::defaults(&cli),
    ));
    let settings = store.settings();

    if cli.save {
        store
            .update(settings.as_ref().clone())
            .map_err(|source| AppError::Settings {
                stage: "save-cli-settings",
                source,
            })?;
    }

    let generator = scribe_llm::create_generator(settings.to_provider_config()).map_err(
        |source| AppError::Provider {
            stage: "create-generator",
            source,
        },
    )?;
    tracing::info!(
        provider = generator.id(),
        model = %settings.model_name,
        "generator ready"
    );

    let policy = if cli.wait {
        ResubmitPolicy::WaitForCompletion
    } else {
        ResubmitPolicy::Supersede
    };
    let controller = SubmissionController::new(generator, store);
    let mut app = StreamApp::new(
        controller,
        PromptInput::new(policy),
        TerminalRegion::new(std::io::stdout(), cli.rows),
    );

    match cli.prompt.as_deref() {
        Some(prompt) => app.run_once(prompt).await,
        None => {
            app.run_interactive(tokio::io::BufReader::new(tokio::io::stdin()))
                .await
        }
    }
}
