//! Offline evaluation of the novelty pipeline against labelled questions.
//!
//! Datasets are JSONL, one `{"question": ..., "expected": "YES" | "NO"}` per
//! line, using the pipeline's own convention (YES = novel). A line may carry a
//! `"split"` name (e.g. `validation`, `test`) for selecting a subset. Cases run
//! sequentially through the full pipeline, and every report records the search
//! and model parameters it was produced with.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{AppConfig, SearchMode};
use crate::pipeline::NoveltyPipeline;
use crate::types::Novelty;

/// Errors while reading or writing evaluation files.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid dataset line {line}: {message}")]
    InvalidLine { line: usize, message: String },
}

/// One labelled question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    pub expected: Novelty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
}

#[derive(Deserialize)]
struct RawCase {
    question: String,
    expected: String,
    #[serde(default)]
    split: Option<String>,
}

/// Search and model settings an evaluation ran with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalParameters {
    /// Papers retrieved per question, after clamping to the provider limit.
    pub evidence_limit: usize,
    pub search_mode: SearchMode,
    pub hybrid_search: bool,
    pub neural_ratio: f64,
    pub llm_provider: String,
    pub model: String,
    /// Dataset split the cases were drawn from; `None` means all cases.
    pub split: Option<String>,
}

impl EvalParameters {
    pub fn from_config(config: &AppConfig, split: Option<&str>) -> Self {
        Self {
            evidence_limit: config
                .pipeline
                .evidence_limit
                .clamp(1, config.search.max_limit.max(1)),
            search_mode: config.search.mode,
            hybrid_search: config.search.mode == SearchMode::Hybrid,
            neural_ratio: config.search.effective_neural_ratio(),
            llm_provider: config.llm.provider.clone(),
            model: config.llm.model.clone(),
            split: split.map(str::to_string),
        }
    }
}

/// Binary classification counts with YES as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl BinaryMetrics {
    pub fn record(&mut self, predicted: Novelty, expected: Novelty) {
        match (predicted, expected) {
            (Novelty::Yes, Novelty::Yes) => self.true_positives += 1,
            (Novelty::No, Novelty::No) => self.true_negatives += 1,
            (Novelty::Yes, Novelty::No) => self.false_positives += 1,
            (Novelty::No, Novelty::Yes) => self.false_negatives += 1,
            _ => {}
        }
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

/// Exact, case-insensitive YES/NO match.
pub fn score_yes_no(predicted: &str, expected: &str) -> f64 {
    if predicted.trim().eq_ignore_ascii_case(expected.trim()) {
        1.0
    } else {
        0.0
    }
}

/// Result of running one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub question: String,
    pub expected: Novelty,
    /// `None` when the pipeline failed.
    pub predicted: Option<Novelty>,
    pub score: f64,
    pub explanation: Option<String>,
    pub evidence_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub correct: usize,
    /// Correct over total; unknowns and failures count as wrong.
    pub accuracy: f64,
    pub unknown: usize,
    pub failures: usize,
    pub metrics: BinaryMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub parameters: EvalParameters,
    pub summary: EvalSummary,
    pub outcomes: Vec<CaseOutcome>,
}

/// Parse a JSONL dataset. Blank lines are skipped.
pub fn parse_dataset(reader: impl BufRead) -> Result<Vec<EvalCase>, EvalError> {
    let mut cases = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| EvalError::InvalidLine {
            line: line_no,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawCase = serde_json::from_str(&line).map_err(|e| EvalError::InvalidLine {
            line: line_no,
            message: e.to_string(),
        })?;
        let expected =
            Novelty::from_token(&raw.expected).ok_or_else(|| EvalError::InvalidLine {
                line: line_no,
                message: format!("expected must be YES or NO, got '{}'", raw.expected),
            })?;
        cases.push(EvalCase {
            question: raw.question,
            expected,
            split: raw.split,
        });
    }
    Ok(cases)
}

pub fn load_dataset(path: &Path) -> Result<Vec<EvalCase>, EvalError> {
    let file = std::fs::File::open(path).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dataset(std::io::BufReader::new(file))
}

/// Keep the cases of one split (case-insensitive). `None` keeps everything;
/// cases without a split never match a named one.
pub fn select_split(cases: Vec<EvalCase>, split: Option<&str>) -> Vec<EvalCase> {
    let Some(split) = split else {
        return cases;
    };
    cases
        .into_iter()
        .filter(|case| {
            case.split
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case(split.trim()))
        })
        .collect()
}

/// Run every case through the pipeline, in order.
pub async fn run_evaluation(
    pipeline: &NoveltyPipeline,
    cases: &[EvalCase],
    parameters: EvalParameters,
) -> EvalReport {
    let mut outcomes = Vec::with_capacity(cases.len());
    for (idx, case) in cases.iter().enumerate() {
        info!(case = idx + 1, total = cases.len(), "Evaluating question");
        let outcome = match pipeline.run(&case.question).await {
            Ok(report) => CaseOutcome {
                question: case.question.clone(),
                expected: case.expected,
                predicted: Some(report.novelty),
                score: score_yes_no(report.novelty.as_str(), case.expected.as_str()),
                explanation: Some(report.explanation),
                evidence_count: report.papers.len(),
                error: None,
            },
            Err(err) => {
                warn!(case = idx + 1, error = %err, "Evaluation case failed");
                CaseOutcome {
                    question: case.question.clone(),
                    expected: case.expected,
                    predicted: None,
                    score: 0.0,
                    explanation: None,
                    evidence_count: 0,
                    error: Some(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let summary = summarize(&outcomes);
    info!(
        total = summary.total,
        accuracy = summary.accuracy,
        failures = summary.failures,
        model = parameters.model.as_str(),
        search_mode = %parameters.search_mode,
        "Evaluation complete"
    );
    EvalReport {
        parameters,
        summary,
        outcomes,
    }
}

pub fn summarize(outcomes: &[CaseOutcome]) -> EvalSummary {
    let mut summary = EvalSummary {
        total: outcomes.len(),
        ..EvalSummary::default()
    };
    for outcome in outcomes {
        match outcome.predicted {
            None => summary.failures += 1,
            Some(Novelty::Unknown) => summary.unknown += 1,
            Some(predicted) => summary.metrics.record(predicted, outcome.expected),
        }
        if outcome.score >= 1.0 {
            summary.correct += 1;
        }
    }
    summary.accuracy = if summary.total == 0 {
        0.0
    } else {
        summary.correct as f64 / summary.total as f64
    };
    summary
}

/// Write one JSON object per outcome.
pub fn write_outcomes(path: &Path, outcomes: &[CaseOutcome]) -> Result<(), EvalError> {
    let io_err = |source: std::io::Error| EvalError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut writer = std::io::BufWriter::new(file);
    for outcome in outcomes {
        let line = serde_json::to_string(outcome).map_err(|e| EvalError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        writeln!(writer, "{}", line).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Write the parameters and totals of a run as one pretty-printed JSON object.
pub fn write_summary(path: &Path, report: &EvalReport) -> Result<(), EvalError> {
    let record = serde_json::json!({
        "parameters": report.parameters,
        "summary": report.summary,
    });
    let text = serde_json::to_string_pretty(&record).map_err(|e| EvalError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    std::fs::write(path, text).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })
}
