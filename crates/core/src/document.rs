//! Documents and chunks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of source a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Forensics book chapter
    #[default]
    Book,
    /// Tool manual or reference page
    #[serde(alias = "doc")]
    ToolDoc,
    /// Organisation SOP / internal knowledge
    #[serde(alias = "org")]
    OrgDoc,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Book => "book",
            SourceType::ToolDoc => "tool_doc",
            SourceType::OrgDoc => "org_doc",
        }
    }

    /// Label used in the contextual prefix
    pub fn prefix_label(&self) -> &'static str {
        match self {
            SourceType::Book => "Source",
            SourceType::ToolDoc => "Document",
            SourceType::OrgDoc => "Organization Knowledge",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "book" => Ok(SourceType::Book),
            "tool_doc" | "tool-doc" | "doc" => Ok(SourceType::ToolDoc),
            "org_doc" | "org-doc" | "org" => Ok(SourceType::OrgDoc),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

/// Normalized source text plus provenance, as produced by extraction
///
/// Immutable once ingested; re-ingestion replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier; chunk ids derive from it
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    /// Normalized markdown-ish text
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            chapter: None,
            section: None,
            source_type: SourceType::Book,
            text: text.into(),
        }
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }
}

/// A bounded span of a document's text
///
/// Never mutated after creation; superseded on re-ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{escaped document id}_{index:04}`, see [`chunk_id`]
    pub id: String,
    pub document_id: String,
    /// Position within the document
    pub index: usize,
    pub title: String,
    pub source_type: SourceType,
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub page: Option<u32>,
    /// Text as it appears in the source (display and citation)
    pub raw_text: String,
    /// Contextual prefix + raw text (embedded and indexed). Empty until prefixed.
    pub prefixed_text: String,
    pub token_count: usize,
    /// Byte offsets of `raw_text` in the source document
    pub start: usize,
    pub end: usize,
    pub has_code: bool,
    pub has_table: bool,
    pub has_command: bool,
    /// Single atomic unit larger than the target length, kept whole
    pub oversized: bool,
}

impl Chunk {
    /// Text that should be embedded and indexed
    pub fn index_text(&self) -> &str {
        if self.prefixed_text.is_empty() {
            &self.raw_text
        } else {
            &self.prefixed_text
        }
    }
}

/// Deterministic chunk id from document + position
///
/// ASCII alphanumerics, `-` and `.` are kept verbatim and every other byte is
/// percent-encoded, so the id is injective in the exact document id: `AOMF`
/// and `aomf` or `ch-04` and `ch_04` never share chunk ids. The `_` before
/// the index cannot occur in the encoded part.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    let mut id = String::with_capacity(document_id.len() + 5);
    for byte in document_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            id.push(byte as char);
        } else {
            id.push_str(&format!("%{:02X}", byte));
        }
    }
    id.push_str(&format!("_{:04}", index));
    id
}
