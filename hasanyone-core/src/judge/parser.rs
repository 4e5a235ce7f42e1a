//! Free-text model output -> tagged parse result.
//!
//! The parser never fails. Output without a recognizable `NOVEL:` flag comes
//! back as [`ParsedOutput::Unparseable`] carrying the raw text, and the caller
//! decides what to do with it.

use std::collections::BTreeSet;

use crate::prompt::{CITATIONS_TAG, EXPLANATION_TAG, NOVEL_TAG};
use crate::types::Novelty;

const MISSING_EXPLANATION: &str = "The model did not provide an explanation.";

/// A model answer that followed the output contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub novelty: Novelty,
    pub explanation: String,
    /// Valid evidence numbers, ascending and de-duplicated.
    pub citations: Vec<usize>,
    /// Referenced numbers outside `1..=evidence_count`.
    pub dropped: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    Parsed(ParsedVerdict),
    Unparseable { raw: String },
}

/// Parse a raw answer against a prompt that listed `evidence_count` papers.
pub fn parse_model_output(raw: &str, evidence_count: usize) -> ParsedOutput {
    let mut novelty = None;
    let mut citation_line = None;
    let mut explanation_lines: Vec<&str> = Vec::new();
    let mut loose_lines: Vec<&str> = Vec::new();
    let mut in_explanation = false;

    for line in raw.lines() {
        if let Some(value) = strip_tag(line, NOVEL_TAG) {
            if novelty.is_none() {
                novelty = Some(first_word(value).and_then(Novelty::from_token));
            }
            in_explanation = false;
        } else if let Some(value) = strip_tag(line, CITATIONS_TAG) {
            citation_line.get_or_insert(value);
            in_explanation = false;
        } else if let Some(value) = strip_tag(line, EXPLANATION_TAG) {
            explanation_lines.push(value);
            in_explanation = true;
        } else if in_explanation {
            explanation_lines.push(line.trim_end());
        } else if !line.trim().is_empty() {
            loose_lines.push(line.trim());
        }
    }

    let Some(Some(novelty)) = novelty else {
        return ParsedOutput::Unparseable {
            raw: raw.trim().to_string(),
        };
    };

    let explanation = if explanation_lines.is_empty() {
        loose_lines.join(" ")
    } else {
        explanation_lines.join("\n").trim().to_string()
    };
    let explanation = if explanation.is_empty() {
        MISSING_EXPLANATION.to_string()
    } else {
        explanation
    };

    let mut referenced = BTreeSet::new();
    if let Some(line) = citation_line {
        referenced.extend(numbers_in(line));
    }
    referenced.extend(bracketed_numbers(&explanation));

    let (citations, dropped): (Vec<usize>, Vec<usize>) = referenced
        .into_iter()
        .partition(|n| (1..=evidence_count).contains(n));

    ParsedOutput::Parsed(ParsedVerdict {
        novelty,
        explanation,
        citations,
        dropped,
    })
}

/// Value after `tag` if `line` starts with it, ignoring case and markdown
/// decoration such as `**NOVEL:** YES` or `## Citations:`.
fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let line = line.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '#' | '-' | '>' | '_' | '`')
    });
    let head = line.get(..tag.len())?;
    if !head.eq_ignore_ascii_case(tag) {
        return None;
    }
    let rest = &line[tag.len()..];
    Some(rest.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '`')))
}

fn first_word(value: &str) -> Option<&str> {
    value
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
}

/// Every run of ASCII digits in `text`.
fn numbers_in(text: &str) -> Vec<usize> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Numbers inside square brackets: `[2]`, `[1, 3]`, `[4][5]`.
fn bracketed_numbers(text: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        let inner = &after[..close];
        if inner
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace())
        {
            found.extend(numbers_in(inner));
        }
        rest = &after[close + 1..];
    }
    found
}
