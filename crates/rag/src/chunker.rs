//! Structure-aware chunking for forensic reference text
//!
//! Splits at decreasing granularity (chapter and section headings, code
//! fences, paragraphs, lines, words) and never places a boundary strictly
//! inside an atomic region:
//!
//! - fenced code blocks (an unterminated fence runs to the end of the text)
//! - markdown tables (consecutive lines starting with `|`)
//! - command blocks (consecutive `vol`, `vol.py`, `volatility` or `$ ` lines,
//!   plus lines continued from a command ending in `\`)
//!
//! An atomic region larger than the target is kept whole and flagged
//! `oversized`. Chapter and section provenance is tracked from `#` headings
//! across chunk boundaries.
//!
//! # Usage
//!
//! ```ignore
//! use dfir_rag::chunker::{ChunkConfig, DocumentChunker};
//!
//! let chunker = DocumentChunker::new(ChunkConfig::default());
//! let chunks = chunker.chunk(&document);
//! ```

use std::ops::Range;

use dfir_config::constants::chunking;
use dfir_config::ChunkingSettings;
use dfir_core::{chunk_id, Chunk, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Split points, coarsest first. A split lands just after the leading
/// newline or space of the separator.
const SEPARATORS: &[&str] = &[
    "\n# ", "\n## ", "\n### ", "\n#### ", "\n```", "\n\n", "\n", " ",
];

static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!--\s*page\s+(\d+)\s*-->").unwrap());

/// Chunk sizes in estimated tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    /// A trailing chunk below this is merged into its predecessor
    pub min_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_tokens: chunking::TARGET_TOKENS,
            overlap_tokens: chunking::OVERLAP_TOKENS,
            min_tokens: chunking::MIN_TOKENS,
            chars_per_token: chunking::CHARS_PER_TOKEN,
        }
    }
}

impl From<&ChunkingSettings> for ChunkConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            target_tokens: settings.target_tokens,
            overlap_tokens: settings.overlap_tokens,
            min_tokens: settings.min_tokens,
            chars_per_token: settings.chars_per_token.max(1),
        }
    }
}

/// Estimate tokens from grapheme count
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    let graphemes = text.graphemes(true).count();
    graphemes.div_ceil(chars_per_token.max(1))
}

#[derive(Debug, Clone)]
struct Heading {
    pos: usize,
    level: usize,
    title: String,
}

/// Structural map of a document
#[derive(Debug, Default)]
struct Layout {
    /// Atomic regions in byte offsets, ordered by start
    regions: Vec<Range<usize>>,
    headings: Vec<Heading>,
    pages: Vec<(usize, u32)>,
    unterminated_fence: bool,
}

impl Layout {
    fn scan(text: &str) -> Self {
        #[derive(PartialEq, Clone, Copy)]
        enum RunKind {
            Table,
            Command,
        }

        let mut layout = Layout::default();
        let mut fence_start: Option<usize> = None;
        let mut run: Option<(RunKind, Range<usize>)> = None;
        // Previous command line ended in a shell line continuation
        let mut continued = false;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let content = line.trim_end_matches(['\n', '\r']);
            let line_end = line_start + content.len();
            let trimmed = content.trim_start();

            if let Some(start) = fence_start {
                if trimmed.starts_with("```") {
                    layout.regions.push(start..line_end);
                    fence_start = None;
                }
                continue;
            }

            let kind = if trimmed.starts_with("```") {
                None
            } else if continued && !trimmed.is_empty() {
                Some(RunKind::Command)
            } else if trimmed.starts_with('|') {
                Some(RunKind::Table)
            } else if is_command_line(trimmed) {
                Some(RunKind::Command)
            } else {
                None
            };

            let extends_run = matches!((&run, kind), (Some((current, _)), Some(k)) if *current == k);
            if extends_run {
                if let Some((_, range)) = run.as_mut() {
                    range.end = line_end;
                }
            } else {
                if let Some((_, range)) = run.take() {
                    layout.regions.push(range);
                }
                run = kind.map(|k| (k, line_start..line_end));
            }
            continued = kind == Some(RunKind::Command) && content.trim_end().ends_with('\\');

            if trimmed.starts_with("```") {
                fence_start = Some(line_start);
                continue;
            }

            if kind.is_none() {
                if let Some((level, title)) = parse_heading(trimmed) {
                    layout.headings.push(Heading {
                        pos: line_start,
                        level,
                        title,
                    });
                }
                if let Some(page) = PAGE_MARKER
                    .captures(trimmed)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok())
                {
                    layout.pages.push((line_start, page));
                }
            }
        }

        if let Some((_, range)) = run.take() {
            layout.regions.push(range);
        }
        if let Some(start) = fence_start {
            layout.regions.push(start..text.len());
            layout.unterminated_fence = true;
        }

        layout.regions.sort_by_key(|r| r.start);
        layout
    }

    fn splits_region(&self, pos: usize) -> bool {
        self.regions.iter().any(|r| r.start < pos && pos < r.end)
    }

    fn region_containing(&self, pos: usize) -> Option<&Range<usize>> {
        self.regions.iter().find(|r| r.start < pos && pos < r.end)
    }
}

fn is_command_line(line: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "vol ",
        "vol.py ",
        "volatility ",
        "volatility3 ",
        "python vol.py",
        "python3 vol.py",
        "$ ",
    ];
    line == "vol" || PREFIXES.iter().any(|p| line.starts_with(p))
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) || !line[level..].starts_with(' ') {
        return None;
    }
    let title = line[level..].trim().trim_end_matches('#').trim();
    (!title.is_empty()).then(|| (level, title.to_string()))
}

/// Contiguous span produced by splitting
#[derive(Debug, Clone)]
struct Piece {
    range: Range<usize>,
    oversized: bool,
}

/// Document chunker
pub struct DocumentChunker {
    config: ChunkConfig,
}

impl DocumentChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn tokens(&self, text: &str) -> usize {
        estimate_tokens(text, self.config.chars_per_token)
    }

    /// Chunk a document. Prefixed text is left empty for the prefixer.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        let layout = Layout::scan(text);
        if layout.unterminated_fence {
            tracing::warn!(
                document = %document.id,
                "Unterminated code fence, treating end of document as the close"
            );
        }

        let mut pieces = Vec::new();
        self.split_range(text, 0..text.len(), 0, &layout, &mut pieces);
        let spans = self.merge(text, pieces);

        let mut chunks = Vec::with_capacity(spans.len());
        let mut previous_end: Option<Range<usize>> = None;

        for piece in spans {
            let own_start = piece.range.start + leading_ws(&text[piece.range.clone()]);
            let start = match &previous_end {
                Some(prev) if !starts_with_heading(&text[own_start..piece.range.end]) => {
                    self.overlap_start(text, prev, &layout).unwrap_or(own_start)
                }
                _ => own_start,
            };
            previous_end = Some(piece.range.clone());

            let raw = strip_page_markers(text[start..piece.range.end].trim());
            if raw.trim().is_empty() {
                continue;
            }

            let (chapter, section) = provenance(document, &layout.headings, own_start);
            let page = layout
                .pages
                .iter()
                .take_while(|(pos, _)| *pos <= own_start)
                .last()
                .map(|(_, p)| *p)
                .or_else(|| {
                    layout
                        .pages
                        .iter()
                        .find(|(pos, _)| *pos < piece.range.end)
                        .map(|(_, p)| *p)
                });

            let index = chunks.len();
            if piece.oversized {
                tracing::debug!(
                    document = %document.id,
                    index,
                    tokens = self.tokens(&raw),
                    "Keeping oversized atomic unit whole"
                );
            }

            chunks.push(Chunk {
                id: chunk_id(&document.id, index),
                document_id: document.id.clone(),
                index,
                title: document.title.clone(),
                source_type: document.source_type,
                chapter,
                section,
                page,
                token_count: self.tokens(&raw),
                start,
                end: piece.range.end,
                has_code: raw.contains("```"),
                has_table: raw.lines().any(|l| l.trim_start().starts_with('|')),
                has_command: raw.lines().any(|l| is_command_line(l.trim_start())),
                oversized: piece.oversized,
                raw_text: raw,
                prefixed_text: String::new(),
            });
        }

        tracing::debug!(
            document = %document.id,
            chunks = chunks.len(),
            "Chunked document"
        );
        chunks
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        level: usize,
        layout: &Layout,
        out: &mut Vec<Piece>,
    ) {
        if self.tokens(&text[range.clone()]) <= self.config.target_tokens {
            out.push(Piece {
                range,
                oversized: false,
            });
            return;
        }

        let Some(separator) = SEPARATORS.get(level) else {
            out.push(Piece {
                range,
                oversized: true,
            });
            return;
        };

        let points: Vec<usize> = text[range.clone()]
            .match_indices(separator)
            .map(|(i, _)| range.start + i + 1)
            .filter(|&p| p > range.start && p < range.end && !layout.splits_region(p))
            .collect();

        if points.is_empty() {
            self.split_range(text, range, level + 1, layout, out);
            return;
        }

        let mut start = range.start;
        for point in points.into_iter().chain(std::iter::once(range.end)) {
            if point > start {
                self.split_range(text, start..point, level + 1, layout, out);
            }
            start = point;
        }
    }

    /// Greedy merge of adjacent pieces up to the target
    fn merge(&self, text: &str, pieces: Vec<Piece>) -> Vec<Piece> {
        let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());

        for piece in pieces {
            if let Some(last) = merged.last_mut() {
                let opens_section = starts_with_major_heading(text[piece.range.clone()].trim_start())
                    && self.tokens(&text[last.range.clone()]) >= self.config.min_tokens;
                let fits = self.tokens(&text[last.range.start..piece.range.end])
                    <= self.config.target_tokens;

                if !last.oversized && !piece.oversized && fits && !opens_section {
                    last.range.end = piece.range.end;
                    continue;
                }
            }
            merged.push(piece);
        }

        // Fold a short tail into its predecessor
        if merged.len() > 1 {
            let tail_small = merged
                .last()
                .map(|t| {
                    !t.oversized
                        && self.tokens(&text[t.range.clone()]) < self.config.min_tokens
                        && !starts_with_major_heading(text[t.range.clone()].trim_start())
                })
                .unwrap_or(false);
            let prev_ok = !merged[merged.len() - 2].oversized;

            if tail_small && prev_ok {
                if let Some(tail) = merged.pop() {
                    if let Some(prev) = merged.last_mut() {
                        prev.range.end = tail.range.end;
                    }
                }
            }
        }

        merged
    }

    /// Start of the overlap tail taken from the previous span
    fn overlap_start(&self, text: &str, prev: &Range<usize>, layout: &Layout) -> Option<usize> {
        if self.config.overlap_tokens == 0 {
            return None;
        }
        let budget = self.config.overlap_tokens * self.config.chars_per_token;
        let mut pos = prev.end.saturating_sub(budget).max(prev.start);
        while pos < prev.end && !text.is_char_boundary(pos) {
            pos += 1;
        }

        // Begin on a word boundary
        if pos > prev.start {
            let boundary = text[pos..prev.end]
                .char_indices()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8())?;
            pos += boundary;
        }

        // Never open a chunk in the middle of an atomic region
        if let Some(region) = layout.region_containing(pos) {
            pos = region.end;
        }

        let pos = pos + leading_ws(&text[pos.min(prev.end)..prev.end]);
        (pos < prev.end).then_some(pos)
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(ChunkConfig::default())
    }
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn starts_with_heading(s: &str) -> bool {
    parse_heading(s.lines().next().unwrap_or("").trim_start()).is_some()
}

fn starts_with_major_heading(s: &str) -> bool {
    matches!(
        parse_heading(s.lines().next().unwrap_or("")),
        Some((level, _)) if level <= 2
    )
}

fn strip_page_markers(text: &str) -> String {
    if !PAGE_MARKER.is_match(text) {
        return text.to_string();
    }
    text.lines()
        .filter(|l| !(PAGE_MARKER.is_match(l) && PAGE_MARKER.replace(l, "").trim().is_empty()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Chapter and section in effect at `pos`
fn provenance(
    document: &Document,
    headings: &[Heading],
    pos: usize,
) -> (Option<String>, Option<String>) {
    let mut chapter = document.chapter.clone();
    let mut section = document.section.clone();
    let mut subsection: Option<String> = None;

    for heading in headings.iter().take_while(|h| h.pos <= pos) {
        match heading.level {
            1 => {
                chapter = Some(heading.title.clone());
                section = None;
                subsection = None;
            }
            2 => {
                section = Some(heading.title.clone());
                subsection = None;
            }
            3 => subsection = Some(heading.title.clone()),
            _ => {}
        }
    }

    let section = match (section, subsection) {
        (Some(s), Some(sub)) => Some(format!("{} › {}", s, sub)),
        (None, Some(sub)) => Some(sub),
        (s, None) => s,
    };

    (chapter, section)
}
