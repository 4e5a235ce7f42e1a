//! Subcommand handlers.

use clap::Subcommand;
use hasanyone_core::config::{AppConfig, SearchMode, load_config, workspace_config_path};
use hasanyone_core::NoveltyPipeline;
use hasanyone_core::evaluation::{
    EvalParameters, load_dataset, run_evaluation, select_split, write_outcomes, write_summary,
};
use hasanyone_core::gateway::{self, GatewayState};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::render;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether a research question has already been studied
    Check {
        /// The research question
        question: String,

        /// Number of related papers to show in the output
        #[arg(short = 'l', long, default_value_t = 3)]
        papers_limit: usize,

        /// Number of papers to retrieve as evidence
        #[arg(short = 'n', long)]
        evidence_limit: Option<usize>,

        /// Search mode: auto, neural, keyword, hybrid
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Share of neural results in hybrid mode (0.0-1.0)
        #[arg(long)]
        neural_ratio: Option<f64>,

        /// Print the raw JSON report instead of the formatted view
        #[arg(long)]
        json: bool,
    },
    /// Start the novelty-check HTTP API
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the pipeline over a labelled JSONL dataset and report accuracy
    Eval {
        /// Dataset path, one {"question", "expected"} object per line
        dataset: PathBuf,

        /// Only run cases whose "split" field matches (e.g. validation, test)
        #[arg(long)]
        split: Option<String>,

        /// Number of papers to retrieve as evidence
        #[arg(short = 'n', long, alias = "max-results")]
        evidence_limit: Option<usize>,

        /// Search mode: auto, neural, keyword, hybrid
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Share of neural results in hybrid mode (0.0-1.0)
        #[arg(long)]
        neural_ratio: Option<f64>,

        /// Model name for the configured provider
        #[arg(long)]
        model: Option<String>,

        /// Write per-question results here as JSONL
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the run parameters and totals here as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create a default config file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Check {
            question,
            papers_limit,
            evidence_limit,
            mode,
            neural_ratio,
            json,
        } => {
            let mut config = load(workspace, config_path)?;
            apply_search_overrides(&mut config, evidence_limit, mode, neural_ratio);
            handle_check(&question, &config, papers_limit, json).await
        }
        Commands::Serve { host, port } => {
            let mut config = load(workspace, config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            handle_serve(&config).await
        }
        Commands::Eval {
            dataset,
            split,
            evidence_limit,
            mode,
            neural_ratio,
            model,
            output,
            summary,
        } => {
            let mut config = load(workspace, config_path)?;
            apply_search_overrides(&mut config, evidence_limit, mode, neural_ratio);
            if let Some(model) = model {
                config.llm.model = model;
            }
            let outputs = EvalOutputs {
                outcomes: output.as_deref(),
                summary: summary.as_deref(),
            };
            handle_eval(&config, &dataset, split.as_deref(), outputs).await
        }
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    load_config(Some(workspace), config_path, None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn apply_search_overrides(
    config: &mut AppConfig,
    evidence_limit: Option<usize>,
    mode: Option<SearchMode>,
    neural_ratio: Option<f64>,
) {
    if let Some(limit) = evidence_limit {
        config.pipeline.evidence_limit = limit;
    }
    if let Some(mode) = mode {
        config.search.mode = mode;
    }
    if let Some(ratio) = neural_ratio {
        config.search.neural_ratio = ratio.clamp(0.0, 1.0);
        // A ratio only means something when both legs run.
        if mode.is_none() {
            config.search.mode = SearchMode::Hybrid;
        }
    }
}

async fn handle_check(
    question: &str,
    config: &AppConfig,
    papers_limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = NoveltyPipeline::from_config(config)?;
    let report = pipeline.run(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let width = crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(100);
        let color = std::io::stdout().is_terminal();
        print!("{}", render::render_report(&report, papers_limit, width, color));
    }
    Ok(())
}

async fn handle_serve(config: &AppConfig) -> anyhow::Result<()> {
    let pipeline = NoveltyPipeline::from_config(config)?;
    let state = GatewayState::new(pipeline);
    info!(
        host = config.server.host.as_str(),
        port = config.server.port,
        "Starting novelty-check API"
    );
    gateway::run(state, &config.server).await?;
    Ok(())
}

struct EvalOutputs<'a> {
    outcomes: Option<&'a Path>,
    summary: Option<&'a Path>,
}

async fn handle_eval(
    config: &AppConfig,
    dataset: &Path,
    split: Option<&str>,
    outputs: EvalOutputs<'_>,
) -> anyhow::Result<()> {
    let cases = select_split(load_dataset(dataset)?, split);
    if cases.is_empty() {
        match split {
            Some(split) => anyhow::bail!(
                "Dataset {} contains no questions in split '{}'",
                dataset.display(),
                split
            ),
            None => anyhow::bail!("Dataset {} contains no questions", dataset.display()),
        }
    }
    let pipeline = NoveltyPipeline::from_config(config)?;
    let parameters = EvalParameters::from_config(config, split);
    let report = run_evaluation(&pipeline, &cases, parameters).await;

    if let Some(path) = outputs.outcomes {
        write_outcomes(path, &report.outcomes)?;
        println!("Wrote {} results to {}", report.outcomes.len(), path.display());
    }
    if let Some(path) = outputs.summary {
        write_summary(path, &report)?;
        println!("Wrote summary to {}", path.display());
    }
    print!("{}", render::render_summary(&report.parameters, &report.summary));
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            for warning in config.validate() {
                eprintln!("warning: {}", warning);
            }
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
