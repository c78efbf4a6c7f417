//! Contextual prefixes
//!
//! Chunks are embedded and indexed with their provenance in front of the
//! text, e.g.
//!
//! ```text
//! Source: The Art of Memory Forensics
//! Chapter: Process Internals
//! Section: Process Hollowing
//! ---
//! <raw chunk text>
//! ```
//!
//! Absent fields are left out entirely. The raw text stays on the chunk for
//! display and citations.

use dfir_core::Chunk;

#[derive(Debug, Clone, Default)]
pub struct ContextualPrefixer {
    include_page: bool,
}

impl ContextualPrefixer {
    pub fn new(include_page: bool) -> Self {
        Self { include_page }
    }

    /// Build the prefixed text for one chunk
    pub fn prefix(&self, chunk: &Chunk) -> String {
        let mut header = Vec::with_capacity(4);

        if !chunk.title.trim().is_empty() {
            header.push(format!("{}: {}", chunk.source_type.prefix_label(), chunk.title.trim()));
        }
        if let Some(chapter) = non_empty(&chunk.chapter) {
            header.push(format!("Chapter: {}", chapter));
        }
        if let Some(section) = non_empty(&chunk.section) {
            header.push(format!("Section: {}", section));
        }
        if self.include_page {
            if let Some(page) = chunk.page {
                header.push(format!("Page: {}", page));
            }
        }

        if header.is_empty() {
            return chunk.raw_text.clone();
        }

        format!("{}\n---\n{}", header.join("\n"), chunk.raw_text)
    }

    /// Fill `prefixed_text` on every chunk
    pub fn apply(&self, chunks: &mut [Chunk]) {
        for chunk in chunks.iter_mut() {
            chunk.prefixed_text = self.prefix(chunk);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
