use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::classifier::LlmSettings;
use crate::config;

/// Watch HTTP traffic to a local service and expose every endpoint it uses as an MCP tool
///
/// Captures requests on the loopback interface (root or capture privileges
/// required), names each new endpoint, and serves the resulting tools over
/// MCP streamable HTTP at `/mcp`. Tools persist across runs in the config file.
#[derive(Parser, Debug)]
#[command(name = "tapmcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target server URL to observe (defaults to the last target used)
    ///
    /// Example: --target http://localhost:3000
    #[arg(long, env = "TAPMCP_TARGET", value_name = "URL")]
    pub target: Option<String>,

    /// Port for the MCP server (defaults to the config file value, 8081)
    #[arg(long, env = "TAPMCP_MCP_PORT", value_name = "PORT")]
    pub mcp_port: Option<u16>,

    /// Maximum number of tools to register (defaults to the config file value, 100)
    #[arg(long, value_name = "N")]
    pub max_tools: Option<usize>,

    /// Name new tools with an LLM instead of from method and path
    #[arg(long)]
    pub use_llm: bool,

    /// Expose LLM-built groups of endpoints instead of one tool per endpoint
    #[arg(long)]
    pub grouping: bool,

    /// Discard saved groups and rebuild them at startup
    #[arg(long, requires = "grouping")]
    pub regroup: bool,

    /// Server name announced to MCP clients
    #[arg(long, default_value = "tapmcp", value_name = "NAME")]
    pub mcp_name: String,

    /// Config file path
    ///
    /// Defaults to the platform config directory, e.g. ~/.config/tapmcp/config.json
    #[arg(long, env = "TAPMCP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log every captured request
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds to wait for connections and background tasks on shutdown
    #[arg(
        long,
        env = "TAPMCP_SHUTDOWN_TIMEOUT_SECS",
        default_value_t = 10,
        value_name = "SECS"
    )]
    pub shutdown_timeout: u64,

    /// LLM model used for naming and grouping
    #[arg(long, env = "LLM", value_name = "MODEL")]
    pub llm_model: Option<String>,

    /// Base URL of an OpenAI-compatible API (the client appends /chat/completions)
    #[arg(long, env = "LLM_ENDPOINT", value_name = "URL")]
    pub llm_endpoint: Option<String>,

    /// API key for the LLM endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub llm_api_key: Option<String>,
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::default_path().context("Failed to locate config directory"),
        }
    }

    /// Whether any feature needs the classifier.
    pub fn wants_classifier(&self) -> bool {
        self.use_llm || self.grouping
    }

    /// LLM connection settings, required when the classifier is in use.
    pub fn llm_settings(&self) -> Result<Option<LlmSettings>> {
        if !self.wants_classifier() {
            return Ok(None);
        }

        let present = |value: &Option<String>| value.as_deref().filter(|v| !v.is_empty()).map(str::to_string);
        match (
            present(&self.llm_model),
            present(&self.llm_endpoint),
            present(&self.llm_api_key),
        ) {
            (Some(model), Some(endpoint), Some(api_key)) => Ok(Some(LlmSettings {
                model,
                endpoint,
                api_key,
            })),
            _ => bail!(
                "LLM settings required for --use-llm and --grouping: set LLM, LLM_ENDPOINT and LLM_API_KEY (or --llm-model, --llm-endpoint, --llm-api-key)"
            ),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "info,tapmcp=debug" } else { "info" }
    }
}
