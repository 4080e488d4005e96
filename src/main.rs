mod anthropic;
mod cli;
mod collaborators;
mod config;
mod error;
mod interpreter;
mod orchestrator;
mod params;
mod placement;
mod server;
mod state_machine;
mod telemetry;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use anthropic::{AnthropicClient, AnthropicTextGenerator};
use cli::{Cli, Command};
use collaborators::{HttpDetector, HttpGenerator};
use config::AppConfig;
use error::ForgeError;
use interpreter::{ChatController, CommandInterpreter, FallbackChain, ModelInterpreter, RuleInterpreter};
use orchestrator::{OrchestratorSettings, Upload, WorkflowOrchestrator};
use params::{ParamKey, ParamOverrides};
use server::AppState;
use ui::JobProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    telemetry::init(&config.log_level, cli.verbose);

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let orchestrator = build_orchestrator(&config)?;
            let chat = ChatController::new(orchestrator.clone(), build_interpreter(&config)?);
            server::serve(&bind, AppState { orchestrator, chat }).await?;
        }
        Command::Process {
            file,
            scale,
            height,
            floor_count,
            conf_threshold,
        } => {
            let mut overrides = ParamOverrides::new();
            let given = [
                (ParamKey::Scale, scale),
                (ParamKey::Height, height),
                (ParamKey::FloorCount, floor_count.map(f64::from)),
                (ParamKey::ConfThreshold, conf_threshold),
            ];
            for (key, value) in given {
                if let Some(value) = value {
                    overrides.set(key, value)?;
                }
            }

            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let orchestrator = build_orchestrator(&config)?;
            let progress = JobProgress::start(&filename);
            let result = orchestrator
                .submit(Upload { filename, bytes }, &overrides)
                .await
                .unwrap_or_else(Into::into);
            progress.complete(&result);
        }
        Command::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_orchestrator(config: &AppConfig) -> Result<WorkflowOrchestrator, ForgeError> {
    let detector = HttpDetector::new(config.detector_url.clone())?;
    let generator = HttpGenerator::new(config.generator_url.clone())?;
    Ok(WorkflowOrchestrator::new(
        Arc::new(detector),
        Arc::new(generator),
        OrchestratorSettings {
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
            collaborator_timeout: config.collaborator_timeout(),
            retain_error_state: config.retain_error_state,
        },
        config.defaults,
    ))
}

/// Model-backed interpretation first when an API key is configured, rules always last.
fn build_interpreter(config: &AppConfig) -> Result<Arc<dyn CommandInterpreter>, ForgeError> {
    let mut chain: Vec<Box<dyn CommandInterpreter>> = Vec::new();
    if config.llm_enabled() {
        let key = config.llm.api_key.clone();
        let client = match &config.llm.base_url {
            Some(url) => AnthropicClient::with_base_url(key, url.clone())?,
            None => AnthropicClient::new(key)?,
        };
        let generator = AnthropicTextGenerator::new(client, config.llm.model.clone(), config.llm.max_tokens);
        chain.push(Box::new(ModelInterpreter::new(
            Arc::new(generator),
            config.collaborator_timeout(),
        )));
        tracing::info!(model = %config.llm.model, "chat uses the language model with rule fallback");
    } else {
        tracing::info!("no API key configured; chat uses rules only");
    }
    chain.push(Box::new(RuleInterpreter::new()));
    Ok(Arc::new(FallbackChain::new(chain)))
}
