//! Terminal rendering of novelty reports and evaluation summaries.

use crossterm::style::Stylize;
use hasanyone_core::evaluation::{EvalParameters, EvalSummary};
use hasanyone_core::{Novelty, NoveltyReport};
use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Render a report as a plain-text panel, optionally with ANSI colors.
pub fn render_report(
    report: &NoveltyReport,
    papers_limit: usize,
    width: usize,
    color: bool,
) -> String {
    let width = width.clamp(40, 120);
    let mut out = String::new();

    let flag = report.novelty.as_str();
    let flag = if color {
        match report.novelty {
            Novelty::Yes => flag.green().bold().to_string(),
            Novelty::No => flag.red().bold().to_string(),
            Novelty::Unknown => flag.yellow().bold().to_string(),
        }
    } else {
        flag.to_string()
    };
    let meaning = match report.novelty {
        Novelty::Yes => "no prior work found",
        Novelty::No => "already studied",
        Novelty::Unknown => "could not decide",
    };
    let _ = writeln!(out, "\nNovelty Check Result: {} ({})\n", flag, meaning);

    for advisory in &report.advisories {
        let note = wrap(&format!("Note: {}", advisory.message), width, INDENT);
        if color {
            let _ = writeln!(out, "{}", note.dark_yellow());
        } else {
            let _ = writeln!(out, "{}", note);
        }
    }
    if !report.advisories.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "{}\n", wrap(&report.explanation, width, INDENT));

    if !report.citations.is_empty() {
        let _ = writeln!(out, "Citations:");
        for citation in &report.citations {
            let _ = writeln!(out, "{}{}", INDENT, citation.label);
            let url = if color {
                citation.url.as_str().underlined().to_string()
            } else {
                citation.url.clone()
            };
            let _ = writeln!(out, "{}    {}", INDENT, url);
        }
        out.push('\n');
    }

    if !report.papers.is_empty() && papers_limit > 0 {
        let shown = papers_limit.min(report.papers.len());
        let _ = writeln!(
            out,
            "Related Papers (showing {} of {}):",
            shown,
            report.papers.len()
        );
        for paper in report.papers.iter().take(shown) {
            let title = if paper.title.is_empty() {
                "Untitled"
            } else {
                paper.title.as_str()
            };
            let _ = writeln!(out, "\n{}[{}] {}", INDENT, paper.number(), title);
            let year = paper
                .published_date
                .as_deref()
                .and_then(|d| d.get(..4))
                .unwrap_or("N/A");
            let author = paper.author.as_deref().unwrap_or("Unknown author");
            let _ = writeln!(out, "{}    {} ({})", INDENT, author, year);
            let _ = writeln!(out, "{}    {}", INDENT, paper.link);
            let summary = if paper.summary.is_empty() {
                "No summary available"
            } else {
                paper.summary.as_str()
            };
            let _ = writeln!(out, "{}", wrap(summary, width, "      "));
        }
        out.push('\n');
    }

    out
}

/// Render evaluation totals and the settings they were produced with.
pub fn render_summary(parameters: &EvalParameters, summary: &EvalSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nEvaluation Summary");
    let _ = writeln!(
        out,
        "{}Model:      {} ({})",
        INDENT, parameters.model, parameters.llm_provider
    );
    let search = if parameters.hybrid_search {
        format!("hybrid, neural ratio {:.2}", parameters.neural_ratio)
    } else {
        parameters.search_mode.to_string()
    };
    let _ = writeln!(
        out,
        "{}Search:     {}, {} papers per question",
        INDENT, search, parameters.evidence_limit
    );
    if let Some(split) = &parameters.split {
        let _ = writeln!(out, "{}Split:      {}", INDENT, split);
    }
    let _ = writeln!(out, "{}Questions:  {}", INDENT, summary.total);
    let _ = writeln!(
        out,
        "{}Accuracy:   {:.1}% ({} correct)",
        INDENT,
        summary.accuracy * 100.0,
        summary.correct
    );
    let _ = writeln!(
        out,
        "{}Precision:  {:.3}  Recall: {:.3}  F1: {:.3}  (positive = YES)",
        INDENT,
        summary.metrics.precision(),
        summary.metrics.recall(),
        summary.metrics.f1()
    );
    let _ = writeln!(out, "{}Unknown:    {}", INDENT, summary.unknown);
    let _ = writeln!(out, "{}Failures:   {}", INDENT, summary.failures);
    out
}

fn wrap(text: &str, width: usize, indent: &str) -> String {
    let options = textwrap::Options::new(width)
        .initial_indent(indent)
        .subsequent_indent(indent);
    textwrap::fill(text, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasanyone_core::{Advisory, AppConfig, Citation, EvidenceItem, EvidenceLink, SearchMode};

    fn paper(rank: usize, title: &str) -> EvidenceItem {
        EvidenceItem {
            title: title.into(),
            summary: String::new(),
            link: EvidenceLink::parse(Some(&format!("https://example.org/{}", rank))),
            rank,
            author: None,
            published_date: Some("2019-05-01".into()),
        }
    }

    fn report() -> NoveltyReport {
        NoveltyReport {
            novelty: Novelty::No,
            explanation: "Studied in [1].".into(),
            citations: vec![Citation {
                label: "[1] First".into(),
                url: "https://example.org/0".into(),
            }],
            advisories: vec![],
            papers: vec![paper(0, "First"), paper(1, "Second"), paper(2, "")],
        }
    }

    #[test]
    fn test_render_report_plain() {
        let text = render_report(&report(), 2, 80, false);
        assert!(text.contains("Novelty Check Result: NO (already studied)"));
        assert!(text.contains("Citations:"));
        assert!(text.contains("https://example.org/0"));
        assert!(text.contains("Related Papers (showing 2 of 3):"));
        assert!(text.contains("[2] Second"));
        assert!(!text.contains("Untitled"));
        assert!(text.contains("Unknown author (2019)"));
        assert!(text.contains("No summary available"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_render_report_shows_advisory() {
        let mut r = report();
        r.novelty = Novelty::Yes;
        r.papers.clear();
        r.citations.clear();
        r.advisories.push(Advisory::no_evidence());
        let text = render_report(&r, 3, 80, false);
        assert!(text.contains("Note: No related literature was retrieved."));
        assert!(!text.contains("Related Papers"));
    }

    #[test]
    fn test_render_report_colors() {
        let text = render_report(&report(), 3, 80, true);
        assert!(text.contains('\x1b'));
    }

    #[test]
    fn test_render_summary() {
        let summary = EvalSummary {
            total: 4,
            correct: 3,
            accuracy: 0.75,
            ..EvalSummary::default()
        };
        let mut config = AppConfig::default();
        config.search.mode = SearchMode::Hybrid;
        config.search.neural_ratio = 0.5;
        let parameters = EvalParameters::from_config(&config, Some("test"));
        let text = render_summary(&parameters, &summary);
        assert!(text.contains("Accuracy:   75.0% (3 correct)"));
        assert!(text.contains("Model:      gemini-2.0-flash (gemini)"));
        assert!(text.contains("Search:     hybrid, neural ratio 0.50, 5 papers per question"));
        assert!(text.contains("Split:      test"));

        let parameters = EvalParameters::from_config(&AppConfig::default(), None);
        let text = render_summary(&parameters, &summary);
        assert!(text.contains("Search:     auto, 5 papers"));
        assert!(!text.contains("Split:"));
    }
}
