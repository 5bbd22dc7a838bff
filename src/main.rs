mod api;
mod chat;
mod cli;
mod completion;
mod error;
mod handler;
mod health;
mod metadata;
mod pipeline;
mod prompts;
mod schemas;
mod server;
mod storage;
mod survey;
mod types;

use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, DownloadArguments, PipelineArguments, ServeArguments};
use crate::completion::{CompletionProvider, GroqClient};
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::PipelineKind;
use crate::server::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServiceResult<()> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::GenerateEvents(args) => {
            run_blocking(move || generate(PipelineKind::Events, args)).await
        }
        Command::GenerateMeasures(args) => {
            run_blocking(move || generate(PipelineKind::Measures, args)).await
        }
        Command::DownloadSurvey(args) => run_blocking(move || download(args)).await,
        Command::Version => {
            println!("{} {}", metadata::PKG_NAME, metadata::PKG_VERSION);
            Ok(())
        }
    }
}

async fn run_blocking<F>(f: F) -> ServiceResult<()>
where
    F: FnOnce() -> ServiceResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::FromString(format!("spawn_blocking failed: {e}")))?
}

async fn serve(args: ServeArguments) -> ServiceResult<()> {
    args.validate().map_err(ServiceError::Config)?;

    let provider: Option<Arc<dyn CompletionProvider>> =
        match GroqClient::new(args.settings.completion_config()) {
            Ok(client) => {
                tracing::info!(model = client.model(), "AI provider configured");
                Some(Arc::new(client) as Arc<dyn CompletionProvider>)
            }
            Err(err) => {
                tracing::warn!("{err}; chat replies are disabled");
                None
            }
        };

    let state = Arc::new(AppState::new(
        args.settings.store(),
        &args.settings.prompts_dir,
        provider,
    ));
    tracing::info!(data_dir = %state.store.data_dir().display(), "starting {}", metadata::PKG_NAME);

    let listener = server::bind(&args.http_addr).await?;
    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        ctrl_c.cancel();
    });

    server::serve(listener, state, shutdown).await
}

fn confirm_overwrite(target: &std::path::Path) -> ServiceResult<bool> {
    if !target.exists() || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(format!("{} already exists. Overwrite?", target.display()))
        .default(false)
        .interact()
        .map_err(|e| ServiceError::FromString(format!("Prompt failed: {e}")))
}

fn generate(kind: PipelineKind, args: PipelineArguments) -> ServiceResult<()> {
    let store = args.settings.store();
    let target = store.data_dir().join(kind.output_file());
    if !args.yes && !confirm_overwrite(&target)? {
        println!("{}", "Aborted, nothing was written.".yellow());
        return Ok(());
    }

    let client = GroqClient::new(args.settings.completion_config())?;
    let report = pipeline::run(
        kind,
        &args.csv_path(),
        &args.settings.prompts_dir,
        &client,
        &store,
    )?;

    println!(
        "{} {} ({} groups, {} entries)",
        "wrote".green().bold(),
        target.display(),
        report.groups,
        report.entries
    );
    Ok(())
}

fn download(args: DownloadArguments) -> ServiceResult<()> {
    let url = args
        .survey_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ServiceError::Config("SURVEY_URL is not set".to_string()))?;
    let dest = args.settings.store().survey_path();
    let table = survey::download_survey(url, &dest)?;
    println!(
        "{} {} ({} columns, {} answers)",
        "saved".green().bold(),
        dest.display(),
        table.headers.len(),
        table.rows.len()
    );
    Ok(())
}
