//! The novelty-check orchestrator.
//!
//! `Validate -> Retrieve -> BuildPrompt -> Judge -> Finalize`. Each stage runs
//! only if the previous one succeeded; a failure short-circuits with the error
//! kind of the stage that produced it. Nothing is shared between runs except
//! the immutable provider clients built at construction.

use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::AppConfig;
use crate::error::{ConfigError, HasAnyoneError};
use crate::judge::{JudgmentEngine, Sleeper};
use crate::prompt::PromptBuilder;
use crate::providers::{TextModel, create_model};
use crate::retriever::{EvidenceRetriever, ExaSearchProvider, SearchProvider};
use crate::types::{Advisory, EvidenceSet, Novelty, NoveltyReport, Question, Verdict};

/// Terminal value of a run: a report or the failure that stopped it.
pub type PipelineResult = Result<NoveltyReport, HasAnyoneError>;

/// Pipeline stages, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Retrieve,
    BuildPrompt,
    Judge,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "validate"),
            Stage::Retrieve => write!(f, "retrieve"),
            Stage::BuildPrompt => write!(f, "build_prompt"),
            Stage::Judge => write!(f, "judge"),
            Stage::Finalize => write!(f, "finalize"),
        }
    }
}

pub struct NoveltyPipeline {
    retriever: EvidenceRetriever,
    prompts: PromptBuilder,
    engine: JudgmentEngine,
    evidence_limit: usize,
}

impl NoveltyPipeline {
    pub fn new(
        retriever: EvidenceRetriever,
        engine: JudgmentEngine,
        evidence_limit: usize,
    ) -> Self {
        Self {
            retriever,
            prompts: PromptBuilder::new(),
            engine,
            evidence_limit,
        }
    }

    /// Build a pipeline from already-constructed providers.
    pub fn with_providers(
        config: &AppConfig,
        search: Arc<dyn SearchProvider>,
        model: Arc<dyn TextModel>,
    ) -> Self {
        let retriever =
            EvidenceRetriever::new(search, config.search.max_limit, config.search.timeout());
        let engine = JudgmentEngine::new(model, config.retry.clone(), config.llm.timeout());
        Self::new(retriever, engine, config.pipeline.evidence_limit)
    }

    /// Build the production pipeline: Exa for search, the configured model provider.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.check()?;
        for warning in config.validate() {
            warn!(warning = warning.as_str(), "Configuration warning");
        }
        let search: Arc<dyn SearchProvider> = Arc::new(ExaSearchProvider::new(&config.search)?);
        let model = create_model(&config.llm)?;
        info!(
            search_mode = %config.search.mode,
            model = model.model_name(),
            evidence_limit = config.pipeline.evidence_limit,
            "Novelty pipeline ready"
        );
        Ok(Self::with_providers(config, search, model))
    }

    /// Replace the sleeper the judgment stage waits on between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.engine = self.engine.with_sleeper(sleeper);
        self
    }

    pub fn evidence_limit(&self) -> usize {
        self.retriever.clamp_limit(self.evidence_limit)
    }

    /// Run one novelty check.
    pub async fn run(&self, raw_question: &str) -> PipelineResult {
        let span = info_span!("novelty_check", question_len = raw_question.trim().len());
        self.run_stages(raw_question).instrument(span).await
    }

    async fn run_stages(&self, raw_question: &str) -> PipelineResult {
        let question = Question::parse(raw_question).inspect_err(|e| {
            debug!(stage = %Stage::Validate, error = %e, "Rejected question");
        })?;
        info!(question = %question.preview(), "Checking novelty");

        let evidence = self
            .retriever
            .retrieve(&question, self.evidence_limit)
            .await
            .inspect_err(|e| {
                warn!(stage = %Stage::Retrieve, error = %e, "Literature search failed");
            })?;

        let prompt = self.prompts.build(&question, &evidence);
        debug!(
            stage = %Stage::BuildPrompt,
            prompt_chars = prompt.as_str().len(),
            evidence_count = prompt.evidence_count(),
            "Prompt rendered"
        );

        let verdict = self.engine.judge(&prompt).await.inspect_err(|e| {
            warn!(stage = %Stage::Judge, error = %e, "Judgment failed");
        })?;

        Ok(finalize(verdict, evidence))
    }
}

/// Assemble the report: drop citations whose URL is not in the evidence and
/// attach advisories.
pub fn finalize(verdict: Verdict, evidence: EvidenceSet) -> NoveltyReport {
    let Verdict {
        novelty,
        explanation,
        citations,
        unparseable,
    } = verdict;

    let citations: Vec<_> = citations
        .into_iter()
        .filter(|citation| {
            let known = evidence.contains_url(&citation.url);
            if !known {
                warn!(
                    stage = %Stage::Finalize,
                    url = citation.url.as_str(),
                    "Dropping citation to a URL outside the evidence set"
                );
            }
            known
        })
        .collect();

    let mut advisories = Vec::new();
    if novelty == Novelty::Yes && evidence.is_empty() {
        advisories.push(Advisory::no_evidence());
    }
    if unparseable {
        advisories.push(Advisory::unparseable_model_output());
    }

    NoveltyReport {
        novelty,
        explanation,
        citations,
        advisories,
        papers: evidence.into_items(),
    }
}
