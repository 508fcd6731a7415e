//! Command-line interface for querygate.
//!
//! `serve` runs the HTTP service, `check` validates a statement against the
//! safety policy, and `ask` runs one question through the gate and prints the
//! same JSON body the service would return.

use crate::config::Config;
use crate::db::DatabaseBackend;
use crate::error::{GateError, Result};
use crate::llm::LlmProvider;
use crate::query::{ConfirmationGate, GateRequest};
use crate::safety::SafetyPolicy;
use crate::server::{self, AppState, ServiceInfo};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Natural-language to SQL with a safety and confirmation gate.
#[derive(Parser, Debug)]
#[command(name = "querygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH", env = "QUERYGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen host
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Listen port
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Validate a SQL statement without running it
    Check {
        /// The statement to validate
        #[arg(value_name = "SQL")]
        sql: String,

        /// Evaluate as a confirmed request
        #[arg(long)]
        allow_destructive: bool,

        /// Comma-separated table allow-list
        #[arg(long, value_name = "TABLES", value_delimiter = ',')]
        allowed_tables: Vec<String>,
    },

    /// Run one question through the gate
    Ask {
        /// The natural-language question
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Confirm a destructive statement
        #[arg(long)]
        confirm: bool,

        /// Include retrieved context in the prompt
        #[arg(long)]
        use_context: bool,

        /// Use the in-memory mock database
        #[arg(long)]
        mock_db: bool,

        /// LLM provider (openai, groq or mock)
        #[arg(long, value_name = "PROVIDER")]
        llm: Option<String>,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Loads the config file and environment, then applies flags of the
    /// selected command on top.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        match &self.command {
            Command::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            }
            Command::Ask { mock_db, llm, .. } => {
                if *mock_db {
                    config.database.backend = DatabaseBackend::Mock;
                }
                if let Some(provider) = llm {
                    config.llm.provider = provider.parse::<LlmProvider>().map_err(GateError::config)?;
                }
            }
            Command::Check { .. } => {}
        }
        Ok(())
    }
}

/// Runs the selected command.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    crate::logging::init(&config.logging);

    match cli.command {
        Command::Serve { .. } => serve(&config).await,
        Command::Check {
            sql,
            allow_destructive,
            allowed_tables,
        } => {
            let output = check(&config, &sql, allow_destructive, allowed_tables)?;
            println!("{output}");
            Ok(())
        }
        Command::Ask {
            question,
            confirm,
            use_context,
            ..
        } => {
            let request = GateRequest {
                query: question,
                use_context,
                confirm_destructive: confirm,
            };
            let output = ask(&config, request).await?;
            println!("{output}");
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> Result<()> {
    let gate = ConfirmationGate::from_config(config).await?;
    let state = AppState::new(gate, ServiceInfo::from_config(config));
    let gate = Arc::clone(state.gate());
    server::serve(&config.server, state).await?;

    info!("Closing database client");
    gate.database().close().await
}

/// Validates `sql` and renders the verdict as pretty JSON.
pub fn check(
    config: &Config,
    sql: &str,
    allow_destructive: bool,
    allowed_tables: Vec<String>,
) -> Result<String> {
    let tables = if allowed_tables.is_empty() {
        config.safety.allowed_tables.clone()
    } else {
        allowed_tables
    };
    let verdict = SafetyPolicy::new()
        .with_allowed_tables(tables)
        .evaluate(sql, allow_destructive && config.safety.allow_destructive_queries);

    serde_json::to_string_pretty(&verdict)
        .map_err(|e| GateError::internal(format!("Failed to render verdict: {e}")))
}

/// Runs one attempt and renders the response body as pretty JSON.
pub async fn ask(config: &Config, request: GateRequest) -> Result<String> {
    let gate = ConfirmationGate::from_config(config).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = gate.handle(&request, &cancel).await;
    if let Err(e) = gate.database().close().await {
        tracing::warn!("Failed to close database client: {}", e);
    }

    let (_, body) = server::outcome_body(&outcome?);
    serde_json::to_string_pretty(&body)
        .map_err(|e| GateError::internal(format!("Failed to render response: {e}")))
}
