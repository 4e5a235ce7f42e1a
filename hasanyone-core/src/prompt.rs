//! Deterministic prompt rendering.
//!
//! The prompt embeds the question verbatim, numbers the evidence in retrieval
//! order (number = rank + 1), and ends with a tagged output contract that
//! [`crate::judge::parser`] relies on. Rendering is pure: the same question and
//! evidence always produce byte-identical text.

use std::fmt::Write as _;

use crate::types::{EvidenceSet, Question};

/// Tag carrying the novelty flag in the model's answer.
pub const NOVEL_TAG: &str = "NOVEL:";
/// Tag carrying the list of cited paper numbers.
pub const CITATIONS_TAG: &str = "CITATIONS:";
/// Tag introducing the free-text explanation.
pub const EXPLANATION_TAG: &str = "EXPLANATION:";

const TASK_PREAMBLE: &str = "Your task is to decide whether anyone has already studied the \
research question below. To help you, you are given the results of an academic literature \
search for this topic: the title of each returned paper and a summary of it. The search \
always returns papers when it can, even when the question is novel, so judge relevance \
carefully.";

/// A paper the model may cite, as numbered in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationTarget {
    pub number: usize,
    pub title: String,
    pub url: String,
}

/// Rendered prompt text plus the numbering that was injected into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    evidence_count: usize,
    targets: Vec<CitationTarget>,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of evidence items listed; valid citation numbers are `1..=evidence_count`.
    pub fn evidence_count(&self) -> usize {
        self.evidence_count
    }

    /// Citable papers by number. Papers without a usable link are absent.
    pub fn citation_targets(&self) -> &[CitationTarget] {
        &self.targets
    }

    pub fn target(&self, number: usize) -> Option<&CitationTarget> {
        self.targets.iter().find(|t| t.number == number)
    }
}

/// Renders questions and evidence into prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, question: &Question, evidence: &EvidenceSet) -> Prompt {
        let mut text = String::with_capacity(1024 + evidence.len() * 512);

        text.push_str(TASK_PREAMBLE);
        text.push_str("\n\n");
        let _ = writeln!(text, "Research Question: {}", question.as_str());
        text.push('\n');

        let mut targets = Vec::new();
        if evidence.is_empty() {
            text.push_str("Relevant Papers: none.\n");
            text.push_str(
                "The literature search found NO related papers for this question. \
                 There is no prior evidence to cite, so do not cite or invent any papers.\n",
            );
        } else {
            text.push_str("Relevant Papers:\n");
            for item in evidence.items() {
                let number = item.number();
                let title = non_empty_or(&item.title, "Untitled");
                let _ = writeln!(text, "\n[{}] Title: {}", number, title);
                let author = item
                    .author
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .unwrap_or("Unknown");
                let _ = writeln!(text, "    Author: {}", author);
                let _ = writeln!(
                    text,
                    "    Published Date: {}",
                    item.published_date.as_deref().unwrap_or("Unknown")
                );
                let _ = writeln!(
                    text,
                    "    Summary: {}",
                    non_empty_or(&item.summary, "No summary available")
                );
                let _ = writeln!(text, "    URL: {}", item.link);

                if let Some(url) = item.link.as_url() {
                    targets.push(CitationTarget {
                        number,
                        title: title.to_string(),
                        url: url.to_string(),
                    });
                }
            }
        }

        text.push_str("\nInstructions:\n");
        text.push_str(
            "1. Answer YES if the research question appears novel (no paper above already \
             studies it), or NO if it has already been studied.\n",
        );
        if evidence.is_empty() {
            text.push_str(
                "2. Explain your reasoning. No papers were found, so write NONE for citations.\n",
            );
        } else {
            let _ = writeln!(
                text,
                "2. Explain your reasoning, referring to papers only by their number in \
                 brackets, e.g. [1]. Valid numbers are 1 to {}.",
                evidence.len()
            );
            text.push_str(
                "3. Only cite papers that are relevant to the research question. Never cite a \
                 paper that is not listed above.\n",
            );
        }

        text.push_str("\nRespond in exactly this format, with each tag at the start of a line:\n");
        let _ = writeln!(text, "{} YES or NO", NOVEL_TAG);
        let _ = writeln!(
            text,
            "{} comma-separated paper numbers supporting your answer, or NONE",
            CITATIONS_TAG
        );
        let _ = write!(text, "{} your explanation", EXPLANATION_TAG);

        Prompt {
            text,
            evidence_count: evidence.len(),
            targets,
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}
