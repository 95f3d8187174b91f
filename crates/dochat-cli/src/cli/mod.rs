//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dochat_core::protocol::SearchMethod;
use tracing_subscriber::EnvFilter;

mod commands;

/// Model ARN the server-side pipeline was built around.
const DEFAULT_MODEL_ARN: &str =
    "arn:aws:bedrock:us-west-2::foundation-model/anthropic.claude-3-sonnet-20240229-v1:0";

#[derive(Parser)]
#[command(name = "dochat")]
#[command(version)]
#[command(about = "Terminal client for the streaming document chatbot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// App origin serving config.json (WebSocket endpoint, CDN domain)
    #[arg(long, env = "DOCHAT_APP_URL", default_value = "http://localhost:3000")]
    app_url: String,

    /// Base URL of the document pipeline API (required for docs commands)
    #[arg(long, env = "DOCHAT_API_URL")]
    api_url: Option<String>,

    /// Model ARN sent with every turn
    #[arg(long, env = "DOCHAT_MODEL_ARN", default_value = DEFAULT_MODEL_ARN)]
    model_arn: String,

    /// Search backend: opensearch or contextual_retrieval
    #[arg(long, env = "DOCHAT_SEARCH_METHOD", default_value = "opensearch")]
    search_method: SearchMethod,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, env = "DOCHAT_LOG", default_value = "warn")]
    log: String,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// Document pipeline status
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },
}

#[derive(clap::Subcommand)]
enum DocsCommands {
    /// One-shot status fetch
    List,
    /// Poll until every document reaches a terminal state
    Watch {
        /// Poll interval in milliseconds
        #[arg(long = "interval-ms", default_value_t = 10_000)]
        interval_ms: u64,
    },
    /// Upload a PDF to the pipeline
    Upload {
        /// Path to a PDF file
        path: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).context("invalid log filter")?)
        .with_writer(std::io::stderr)
        .init();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let api_url = |cli: &Cli| -> Result<String> {
        match cli.api_url.clone() {
            Some(url) => Ok(url),
            None => bail!("--api-url or DOCHAT_API_URL is required for docs commands"),
        }
    };

    match cli.command {
        // default to chat mode
        None | Some(Commands::Chat) => {
            commands::chat::run(&commands::chat::ChatSettings {
                app_url: cli.app_url.clone(),
                model_arn: cli.model_arn.clone(),
                search_method: cli.search_method,
            })
            .await
        }
        Some(Commands::Docs { ref command }) => match command {
            DocsCommands::List => commands::docs::list(&api_url(&cli)?).await,
            DocsCommands::Watch { interval_ms } => {
                commands::docs::watch(&api_url(&cli)?, *interval_ms).await
            }
            DocsCommands::Upload { path } => {
                commands::docs::upload(&api_url(&cli)?, path).await
            }
        },
    }
}
