//! CLI command definitions for debate-forge.
//!
//! `run` drives a debate session against OpenAI-compatible chat endpoints and
//! prints every round as JSON; `config` prints the effective configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agents::{LlmWorker, Provider, Worker};
use crate::config::EngineConfig;
use crate::consensus::ModelAssistedStrategy;
use crate::debate::{ContextResult, DebateEngine, DebateEvent, DebateMode, RoundResult, SessionStatus};
use crate::llm::{ChatClient, LlmProvider};

/// Answer given to context requests when running unattended.
const UNATTENDED_CONTEXT_ANSWER: &str =
    "No additional context is available. Argue from what you already know.";

/// Multi-round, multi-provider agent debates.
#[derive(Parser)]
#[command(name = "debate-forge")]
#[command(about = "Run structured multi-round debates between LLM agents")]
#[command(version)]
#[command(
    long_about = "debate-forge runs a debate session between agents backed by different LLM providers.\n\nEach round is scored for consensus; the session stops early once agreement holds.\n\nExample usage:\n  debate-forge run --topic \"Should we adopt Rust?\" --agent openai=gpt-4o --agent deepseek=deepseek-chat --rounds 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a debate session and print the rounds as JSON.
    Run(RunArgs),

    /// Print the effective configuration as YAML.
    Config(ConfigArgs),
}

/// Arguments for `debate-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Debate topic.
    #[arg(short, long)]
    pub topic: String,

    /// Debate mode (collaborative, adversarial, socratic, expert_panel,
    /// devils_advocate, delphi, synthesis).
    #[arg(short, long, default_value = "collaborative")]
    pub mode: DebateMode,

    /// Maximum number of rounds.
    #[arg(short, long, default_value = "3")]
    pub rounds: u32,

    /// Participant as provider=model; repeat for each agent, in invocation order.
    #[arg(short, long = "agent", required = true)]
    pub agents: Vec<String>,

    /// Question every round should focus on.
    #[arg(long)]
    pub focus: Option<String>,

    /// YAML configuration file; `DEBATE_*` environment variables are used otherwise.
    #[arg(short, long, env = "DEBATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Score consensus with this provider=model instead of the heuristic.
    #[arg(long)]
    pub model_assisted_consensus: Option<String>,
}

/// Arguments for `debate-forge config`.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// YAML configuration file to load before printing.
    #[arg(short, long, env = "DEBATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// A parsed `provider=model` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub provider: Provider,
    pub model: String,
}

impl std::str::FromStr for AgentSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s
            .split_once('=')
            .with_context(|| format!("expected provider=model, got '{}'", s))?;
        let provider: Provider = provider.parse().map_err(anyhow::Error::msg)?;
        let model = model.trim();
        if model.is_empty() {
            anyhow::bail!("missing model in '{}'", s);
        }
        Ok(Self {
            provider,
            model: model.to_string(),
        })
    }
}

impl AgentSpec {
    fn client(&self) -> anyhow::Result<Arc<dyn LlmProvider>> {
        let client = ChatClient::from_env(
            self.provider.default_api_base(),
            self.provider.api_key_env(),
            &self.model,
        )
        .with_context(|| format!("failed to create {} client", self.provider))?;
        Ok(Arc::new(client))
    }
}

/// Gives every agent a unique id, suffixing repeated provider/model pairs.
pub fn agent_ids(specs: &[AgentSpec]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(specs.len());
    for spec in specs {
        let base = format!("{}/{}", spec.provider, spec.model);
        let mut id = base.clone();
        let mut n = 2;
        while ids.contains(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        ids.push(id);
    }
    ids
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_debate_command(args).await,
        Commands::Config(args) => run_config_command(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::from_env().context("failed to read DEBATE_* environment")?,
    };
    Ok(config)
}

fn run_config_command(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    print!("{}", config.to_yaml()?);
    Ok(())
}

async fn run_debate_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;

    let specs = args
        .agents
        .iter()
        .map(|s| s.parse::<AgentSpec>())
        .collect::<anyhow::Result<Vec<_>>>()?;
    let ids = agent_ids(&specs);

    let mut participants: Vec<Arc<dyn Worker>> = Vec::with_capacity(specs.len());
    for (spec, id) in specs.iter().zip(ids) {
        participants.push(Arc::new(LlmWorker::new(
            id,
            spec.provider,
            &spec.model,
            spec.client()?,
        )));
    }

    let (event_tx, mut event_rx) = mpsc::channel::<DebateEvent>(100);
    let event_logger = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(event = %json, "Debate event"),
                Err(e) => warn!(error = %e, "Failed to serialize debate event"),
            }
        }
    });

    let mut builder = DebateEngine::builder().config(config).event_sender(event_tx);
    if let Some(spec) = &args.model_assisted_consensus {
        let spec: AgentSpec = spec.parse()?;
        info!(provider = %spec.provider, model = %spec.model, "Using model-assisted consensus");
        builder = builder.consensus_strategy(Arc::new(ModelAssistedStrategy::new(
            spec.client()?,
            &spec.model,
        )));
    }
    let engine = builder.build()?;

    let session = engine
        .start_session(&args.topic, args.mode, &participants, args.rounds)
        .await?;
    info!(session = %session.status_line(), "Debate started");

    let mut all_rounds: Vec<RoundResult> = Vec::new();
    let mut supplied = Vec::new();
    let mut last_blocked = None;
    loop {
        let recorded = u32::try_from(all_rounds.len()).unwrap_or(u32::MAX);
        let rounds = engine
            .execute_rounds(
                &participants,
                &session.id,
                args.rounds.saturating_sub(recorded),
                args.focus.as_deref(),
                std::mem::take(&mut supplied),
            )
            .await?;

        let blocked = rounds.last().filter(|r| r.needs_context()).cloned();
        all_rounds.extend(rounds.into_iter().filter(|r| !r.needs_context()));

        let Some(round) = blocked else {
            break;
        };
        if last_blocked == Some(round.round_number) {
            warn!(
                round = round.round_number,
                "Agents still need context after it was answered; stopping"
            );
            engine.pause_session(&session.id, "context unavailable").await?;
            break;
        }
        last_blocked = Some(round.round_number);

        warn!(
            round = round.round_number,
            requests = round.required_requests().count(),
            "Context requested; continuing without it"
        );
        supplied = round
            .required_requests()
            .map(|r| ContextResult::answering(r, UNATTENDED_CONTEXT_ANSWER))
            .collect();
    }

    let finished = engine.get_session(&session.id).await?;
    if finished.status != SessionStatus::Completed {
        warn!(session = %finished.status_line(), "Session did not complete");
    } else {
        info!(session = %finished.status_line(), "Debate finished");
    }

    drop(engine);
    let _ = event_logger.await;

    println!("{}", serde_json::to_string_pretty(&all_rounds)?);
    Ok(())
}
