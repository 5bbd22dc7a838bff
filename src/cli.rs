use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::completion::{CompletionConfig, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};
use crate::storage::DocumentStore;

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the REST API for events, measures and chat
    Serve(ServeArguments),
    /// Generate events.json from the survey via the AI provider
    GenerateEvents(PipelineArguments),
    /// Generate massnahmen.json from the survey via the AI provider
    GenerateMeasures(PipelineArguments),
    /// Download the survey export from SURVEY_URL into table.csv
    DownloadSurvey(DownloadArguments),
    /// Print version information
    Version,
}

/// Settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Directory holding events.json, massnahmen.json, messages.json and table.csv
    #[arg(long, env = "HYBRIDWORK_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory with optional prompt override files
    #[arg(long, env = "HYBRIDWORK_PROMPTS_DIR", default_value = "prompts")]
    pub prompts_dir: PathBuf,

    /// API key of the AI provider
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion API
    #[arg(long, env = "GROQ_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Completion model
    #[arg(long, env = "GROQ_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Timeout for a single completion request, in seconds
    #[arg(long, env = "GROQ_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl Settings {
    pub fn store(&self) -> DocumentStore {
        DocumentStore::new(&self.data_dir)
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArguments {
    #[command(flatten)]
    pub settings: Settings,

    /// HTTP bind address
    #[arg(long, env = "HYBRIDWORK_HTTP_ADDR", default_value = "127.0.0.1:8000")]
    pub http_addr: String,
}

impl ServeArguments {
    /// Validate CLI/environment-derived arguments.
    pub fn validate(&self) -> Result<(), String> {
        self.http_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid HYBRIDWORK_HTTP_ADDR '{}': {e}", self.http_addr))?;
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArguments {
    #[command(flatten)]
    pub settings: Settings,

    /// Survey CSV to read (defaults to <data-dir>/table.csv)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Overwrite an existing output file without asking
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

impl PipelineArguments {
    pub fn csv_path(&self) -> PathBuf {
        self.csv
            .clone()
            .unwrap_or_else(|| self.settings.store().survey_path())
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArguments {
    #[command(flatten)]
    pub settings: Settings,

    /// Survey export URL
    #[arg(long, env = "SURVEY_URL")]
    pub survey_url: Option<String>,
}
