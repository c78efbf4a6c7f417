//! Sparse Search using Tantivy (BM25)
//!
//! Keyword side of hybrid retrieval. Exact tool and artifact names
//! (`windows.malfind`, `$MFT`, `lsass.exe`) are where BM25 beats embeddings.
//!
//! Each Tantivy document stores the serialized chunk, so hits carry full
//! provenance without a second lookup.

use parking_lot::Mutex;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
        STRING,
    },
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
};

use dfir_core::Chunk;

use crate::vector_store::SearchFilter;
use crate::RagError;

const TOKENIZER_NAME: &str = "dfir_en";

/// Writer heap
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Query-syntax characters that would otherwise be read as operators
const QUERY_SYNTAX: &[char] = &[
    '+', '-', ':', '^', '(', ')', '[', ']', '{', '}', '"', '~', '*', '!', '\\', '/', '\'',
];

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index path (use RAM if None)
    pub index_path: Option<String>,
    /// Enable English stemming
    pub stemming: bool,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            stemming: true,
        }
    }
}

/// BM25 hit with the stored chunk
#[derive(Debug, Clone)]
pub struct SparseHit {
    pub chunk: Chunk,
    /// Raw BM25 score (unbounded)
    pub score: f32,
}

struct Fields {
    chunk_id: Field,
    document_id: Field,
    source_type: Field,
    text: Field,
    payload: Field,
}

/// Sparse index for BM25 search
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

impl SparseIndex {
    /// Open or create the index
    pub fn new(config: SparseConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let fields = Fields {
            chunk_id: schema_builder.add_text_field("chunk_id", STRING | STORED),
            document_id: schema_builder.add_text_field("document_id", STRING | STORED),
            source_type: schema_builder.add_text_field("source_type", STRING | STORED),
            text: schema_builder.add_text_field("text", text_options),
            payload: schema_builder.add_text_field("payload", STORED),
        };
        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            std::fs::create_dir_all(path).map_err(|e| RagError::Index(e.to_string()))?;
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RagError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema)
        };

        index
            .tokenizers()
            .register(TOKENIZER_NAME, Self::build_tokenizer(&config));

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::info!(
            path = config.index_path.as_deref().unwrap_or("<ram>"),
            stemming = config.stemming,
            docs = reader.searcher().num_docs(),
            "Sparse index opened"
        );

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    fn build_tokenizer(config: &SparseConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        if config.stemming {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            base.build()
        }
    }

    /// Replace every chunk of `document_id` with `chunks` in one commit
    pub fn replace_document(&self, document_id: &str, chunks: &[Chunk]) -> Result<(), RagError> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.fields.document_id, document_id));

        for chunk in chunks {
            let payload = serde_json::to_string(chunk).map_err(|e| RagError::Index(e.to_string()))?;

            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.chunk_id, &chunk.id);
            doc.add_text(self.fields.document_id, &chunk.document_id);
            doc.add_text(self.fields.source_type, chunk.source_type.as_str());
            doc.add_text(self.fields.text, chunk.index_text());
            doc.add_text(self.fields.payload, &payload);

            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        self.commit(&mut writer)
    }

    /// Remove every chunk of a document
    pub fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.fields.document_id, document_id));
        self.commit(&mut writer)
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<(), RagError> {
        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))
    }

    /// BM25 search, best first
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<SparseHit>, RagError> {
        let cleaned: String = query
            .chars()
            .map(|c| if QUERY_SYNTAX.contains(&c) { ' ' } else { c })
            .collect();
        if top_k == 0 || cleaned.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let (text_query, errors) = parser.parse_query_lenient(&cleaned);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Lenient query parse dropped terms");
        }

        let query = self.with_filter(text_query, filter);
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;

            let payload = match doc.get_first(self.fields.payload) {
                Some(OwnedValue::Str(s)) => s.as_str(),
                _ => return Err(RagError::Search("Sparse hit without payload".to_string())),
            };
            let chunk: Chunk = serde_json::from_str(payload)
                .map_err(|e| RagError::Search(format!("Malformed sparse payload: {}", e)))?;

            hits.push(SparseHit { chunk, score });
        }

        Ok(hits)
    }

    fn with_filter(&self, text_query: Box<dyn Query>, filter: &SearchFilter) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if let Some(source_type) = filter.source_type {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.source_type, source_type.as_str()),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        if let Some(ref document_id) = filter.document_id {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.document_id, document_id),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        if clauses.is_empty() {
            return text_query;
        }
        clauses.push((Occur::Must, text_query));
        Box::new(BooleanQuery::new(clauses))
    }

    /// Get document count
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
