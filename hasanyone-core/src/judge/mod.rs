//! Judgment Engine: prompt in, typed verdict out.
//!
//! Each model attempt is bounded by a timeout and wrapped in the retry loop
//! from [`retry`]. The answer is parsed with [`parser::parse_model_output`]
//! and citation numbers are resolved against the numbering the prompt carried.

pub mod parser;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::error::ModelError;
use crate::prompt::Prompt;
use crate::providers::{Generation, TextModel};
use crate::types::{Citation, Novelty, Verdict};

pub use parser::{ParsedOutput, ParsedVerdict, parse_model_output};
pub use retry::{RecordingSleeper, Sleeper, TokioSleeper, with_retry};

pub struct JudgmentEngine {
    model: Arc<dyn TextModel>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
}

impl JudgmentEngine {
    pub fn new(model: Arc<dyn TextModel>, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            model,
            retry,
            sleeper: Arc::new(TokioSleeper),
            timeout,
        }
    }

    /// Replace the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub async fn judge(&self, prompt: &Prompt) -> Result<Verdict, ModelError> {
        let generation = with_retry(&self.retry, self.sleeper.as_ref(), |attempt| {
            self.attempt(prompt, attempt)
        })
        .await?;

        if generation.text.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }

        let verdict = match parse_model_output(&generation.text, prompt.evidence_count()) {
            ParsedOutput::Parsed(parsed) => Self::resolve(parsed, prompt),
            ParsedOutput::Unparseable { raw } => {
                warn!(
                    output_chars = raw.len(),
                    "Model output had no recognizable novelty flag"
                );
                Verdict {
                    novelty: Novelty::Unknown,
                    explanation: raw,
                    citations: Vec::new(),
                    unparseable: true,
                }
            }
        };

        info!(
            novelty = %verdict.novelty,
            citations = verdict.citations.len(),
            "Judgment complete"
        );
        Ok(verdict)
    }

    async fn attempt(&self, prompt: &Prompt, attempt: u32) -> Result<Generation, ModelError> {
        debug!(
            model = self.model.model_name(),
            attempt,
            "Invoking model"
        );
        match tokio::time::timeout(self.timeout, self.model.generate(prompt.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Map parsed citation numbers onto the prompt's citable papers.
    fn resolve(parsed: ParsedVerdict, prompt: &Prompt) -> Verdict {
        if !parsed.dropped.is_empty() {
            warn!(
                dropped = ?parsed.dropped,
                evidence_count = prompt.evidence_count(),
                "Dropped citations outside the evidence range"
            );
        }

        let citations = parsed
            .citations
            .iter()
            .filter_map(|&number| match prompt.target(number) {
                Some(target) => Some(Citation {
                    label: format!("[{}] {}", number, target.title),
                    url: target.url.clone(),
                }),
                None => {
                    debug!(number, "Cited paper has no link; skipping citation");
                    None
                }
            })
            .collect();

        Verdict {
            novelty: parsed.novelty,
            explanation: parsed.explanation,
            citations,
            unparseable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::providers::MockTextModel;
    use crate::types::{EvidenceItem, EvidenceLink, EvidenceSet, Question};
    use async_trait::async_trait;

    fn prompt(links: &[Option<&str>]) -> Prompt {
        let items = links.iter().enumerate().map(|(i, link)| EvidenceItem {
            title: format!("Paper {}", i + 1),
            summary: String::new(),
            link: EvidenceLink::parse(*link),
            rank: 0,
            author: None,
            published_date: None,
        });
        let question = Question::parse("Has anyone studied this?").unwrap();
        PromptBuilder::new().build(&question, &EvidenceSet::from_items(items))
    }

    fn engine(model: Arc<MockTextModel>, sleeper: Arc<RecordingSleeper>) -> JudgmentEngine {
        JudgmentEngine::new(model, RetryConfig::default(), Duration::from_secs(5))
            .with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn test_citations_resolved_in_order() {
        let model = Arc::new(MockTextModel::answering(
            "NOVEL: NO\nCITATIONS: 3, 1\nEXPLANATION: See [1] and [3].",
        ));
        let p = prompt(&[
            Some("https://a.org/1"),
            Some("https://a.org/2"),
            Some("https://a.org/3"),
        ]);
        let verdict = engine(model, Arc::new(RecordingSleeper::new()))
            .judge(&p)
            .await
            .unwrap();
        assert_eq!(verdict.novelty, Novelty::No);
        assert_eq!(
            verdict.citations,
            vec![
                Citation {
                    label: "[1] Paper 1".into(),
                    url: "https://a.org/1".into()
                },
                Citation {
                    label: "[3] Paper 3".into(),
                    url: "https://a.org/3".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_links_not_cited() {
        let model = Arc::new(MockTextModel::answering(
            "NOVEL: NO\nCITATIONS: 1, 2\nEXPLANATION: Both.",
        ));
        let p = prompt(&[None, Some("https://a.org/2")]);
        let verdict = engine(model, Arc::new(RecordingSleeper::new()))
            .judge(&p)
            .await
            .unwrap();
        assert_eq!(verdict.citations.len(), 1);
        assert_eq!(verdict.citations[0].url, "https://a.org/2");
    }

    #[tokio::test]
    async fn test_unparseable_output_becomes_unknown() {
        let model = Arc::new(MockTextModel::answering("Hard to say, honestly."));
        let verdict = engine(model, Arc::new(RecordingSleeper::new()))
            .judge(&prompt(&[]))
            .await
            .unwrap();
        assert_eq!(verdict.novelty, Novelty::Unknown);
        assert_eq!(verdict.explanation, "Hard to say, honestly.");
        assert!(verdict.unparseable);
        assert!(verdict.citations.is_empty());
    }

    #[tokio::test]
    async fn test_blank_output_is_error() {
        let model = Arc::new(MockTextModel::answering("   \n "));
        let err = engine(model.clone(), Arc::new(RecordingSleeper::new()))
            .judge(&prompt(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::EmptyOutput));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
        let model = Arc::new(MockTextModel::new());
        model.queue_error(ModelError::RateLimited {
            retry_after_secs: None,
        });
        model.queue_error(ModelError::RateLimited {
            retry_after_secs: None,
        });
        model.queue_text("NOVEL: YES\nCITATIONS: NONE\nEXPLANATION: Nothing matches.");
        let sleeper = Arc::new(RecordingSleeper::new());

        let verdict = engine(model.clone(), sleeper.clone())
            .judge(&prompt(&[]))
            .await
            .unwrap();
        assert_eq!(verdict.novelty, Novelty::Yes);
        assert_eq!(model.calls(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_output_not_retried() {
        let model = Arc::new(MockTextModel::new());
        model.queue_error(ModelError::MalformedOutput {
            message: "no candidates".into(),
        });
        let err = engine(model.clone(), Arc::new(RecordingSleeper::new()))
            .judge(&prompt(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedOutput { .. }));
        assert_eq!(model.calls(), 1);
    }

    struct StalledModel;

    #[async_trait]
    impl TextModel for StalledModel {
        async fn generate(&self, _prompt: &str) -> Result<Generation, ModelError> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_times_out() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let engine = JudgmentEngine::new(
            Arc::new(StalledModel),
            RetryConfig::default(),
            Duration::from_secs(2),
        )
        .with_sleeper(sleeper.clone());
        let err = engine.judge(&prompt(&[])).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout { timeout_secs: 2 }));
        assert_eq!(sleeper.delays().len(), 2);
    }
}
