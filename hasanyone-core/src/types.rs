//! Core data types flowing through a novelty check.
//!
//! question -> evidence -> prompt -> raw model text -> verdict -> report.
//! Every value here lives for a single request and is never mutated after
//! construction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// A validated research question: trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Question(String);

impl Question {
    /// Trim the raw input and reject it if nothing is left.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 50 characters, for log lines.
    pub fn preview(&self) -> String {
        let mut preview: String = self.0.chars().take(50).collect();
        if self.0.chars().count() > 50 {
            preview.push_str("...");
        }
        preview
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sentinel used on the wire for a missing or malformed link.
pub const UNAVAILABLE_LINK: &str = "unavailable";

/// Link of an evidence item: a well-formed URI or the "unavailable" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceLink {
    Url(url::Url),
    Unavailable,
}

impl EvidenceLink {
    /// Parse a provider-supplied link, falling back to the sentinel.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| url::Url::parse(s).ok())
            .map(EvidenceLink::Url)
            .unwrap_or(EvidenceLink::Unavailable)
    }

    pub fn as_url(&self) -> Option<&url::Url> {
        match self {
            EvidenceLink::Url(url) => Some(url),
            EvidenceLink::Unavailable => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EvidenceLink::Url(url) => url.as_str(),
            EvidenceLink::Unavailable => UNAVAILABLE_LINK,
        }
    }
}

impl fmt::Display for EvidenceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EvidenceLink {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EvidenceLink {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EvidenceLink::parse(Some(&raw)))
    }
}

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub title: String,
    pub summary: String,
    pub link: EvidenceLink,
    /// 0-based retrieval order.
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// `YYYY-MM-DD` when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl EvidenceItem {
    /// 1-based number used in the prompt and in citations.
    pub fn number(&self) -> usize {
        self.rank + 1
    }
}

/// Ordered evidence for one question. Ranks always equal positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    items: Vec<EvidenceItem>,
}

impl EvidenceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set, re-ranking items by their position so numbering stays dense.
    pub fn from_items(items: impl IntoIterator<Item = EvidenceItem>) -> Self {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(rank, item)| EvidenceItem { rank, ..item })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `url` equals the link of some item in this set.
    pub fn contains_url(&self, url: &str) -> bool {
        self.items
            .iter()
            .filter_map(|item| item.link.as_url())
            .any(|link| link.as_str() == url)
    }

    pub fn into_items(self) -> Vec<EvidenceItem> {
        self.items
    }
}

/// Tri-state novelty flag. YES means no prior work was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Novelty {
    Yes,
    No,
    Unknown,
}

impl Novelty {
    /// Case-insensitive YES/NO; anything else is `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Novelty::Yes),
            "NO" => Some(Novelty::No),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Novelty::Yes => "YES",
            Novelty::No => "NO",
            Novelty::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Novelty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference from the verdict back into the evidence set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub label: String,
    pub url: String,
}

/// Typed outcome of the judgment stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub novelty: Novelty,
    pub explanation: String,
    pub citations: Vec<Citation>,
    /// Set when the model output had no recognizable novelty flag.
    #[serde(skip)]
    pub unparseable: bool,
}

/// Machine-readable note attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryCode {
    /// Novel because nothing was retrieved, not because evidence was weighed.
    NoEvidence,
    /// The model answer could not be parsed; explanation holds its raw text.
    UnparseableModelOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub code: AdvisoryCode,
    pub message: String,
}

impl Advisory {
    pub fn no_evidence() -> Self {
        Self {
            code: AdvisoryCode::NoEvidence,
            message: "No related literature was retrieved. This verdict reflects the absence \
                      of contrary evidence, not a confirmed gap in the literature."
                .to_string(),
        }
    }

    pub fn unparseable_model_output() -> Self {
        Self {
            code: AdvisoryCode::UnparseableModelOutput,
            message: "The model's answer did not contain a recognizable YES/NO flag; \
                      the explanation is its literal output."
                .to_string(),
        }
    }
}

/// Successful result of a novelty check, as returned to the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoveltyReport {
    pub novelty: Novelty,
    pub explanation: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,
    /// The evidence the verdict was built from, in retrieval order.
    pub papers: Vec<EvidenceItem>,
}

impl NoveltyReport {
    pub fn has_advisory(&self, code: AdvisoryCode) -> bool {
        self.advisories.iter().any(|a| a.code == code)
    }
}
