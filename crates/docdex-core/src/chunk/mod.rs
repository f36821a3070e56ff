//! Chunking engine
//!
//! Converts a document into a sequence of `ChunkDraft`s with stable
//! line ranges, breadcrumb context, and approximate token counts.
//! Markdown-family files go through the heading-tree strategy; all
//! other files go through the syntax-tree code strategy with a
//! line-chunking fallback.

mod code;
mod language;
mod markdown;
mod split;

pub use code::chunk_code;
pub use language::{file_kind, FileKind, Language};
pub use markdown::{chunk_markdown, has_code_snippet};
pub(crate) use split::{split_by_tokens, LinePart, Overlap};

/// Documents split at this many tokens
pub const DOC_MAX_TOKENS: usize = 600;
/// Token overlap carried between document parts
pub const DOC_OVERLAP_TOKENS: usize = 60;
/// Smallest document part the limiter will emit
pub const DOC_MIN_TOKENS: usize = 40;
/// Consecutive document chunks under this size are merged
pub const DOC_MERGE_UNDER_TOKENS: usize = 200;

/// Target size for one code chunk
pub const CODE_TARGET_TOKENS: usize = 320;
/// Line overlap carried between code parts
pub const CODE_OVERLAP_LINES: usize = 8;
/// Hard ceiling after formatting; larger chunks are subdivided
pub const CODE_MAX_TOKENS: usize = 1000;
/// Consecutive parts of one symbol merge up to this size
pub const CODE_MERGE_MAX_TOKENS: usize = 800;
/// Nested symbol chunks under this size are dropped when duplicated
pub const CODE_TINY_TOKENS: usize = 50;

const PREVIEW_CHARS: usize = 220;

/// Retrievable unit kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Code,
    Doc,
    /// A short document kept whole because its code is inline
    DocInline,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Doc => "doc",
            Self::DocInline => "doc-inline",
        }
    }
}

/// Symbol metadata for code chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub symbol_type: String,
    /// Stable id: name plus byte offsets in the source
    pub id: String,
    pub part_index: Option<usize>,
    pub part_count: Option<usize>,
}

/// One chunk ready for persistence
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub chunk_type: ChunkType,
    /// `<breadcrumb>\n\n<body>`, code bodies fenced
    pub content: String,
    pub context_path: Option<String>,
    pub language: Option<String>,
    pub symbol: Option<SymbolInfo>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    pub char_start: Option<usize>,
    pub char_end: Option<usize>,
    pub token_count: usize,
}

impl ChunkDraft {
    /// Plain document chunk with the token count derived from content
    pub fn doc(content: String, context_path: Option<String>) -> Self {
        let token_count = approx_tokens(&content);
        Self {
            chunk_type: ChunkType::Doc,
            content,
            context_path,
            language: None,
            symbol: None,
            line_start: None,
            line_end: None,
            char_start: None,
            char_end: None,
            token_count,
        }
    }
}

/// Approximate token count: 4 characters per token, at least 1.
///
/// This heuristic fixes chunk boundaries; changing it changes every
/// stored chunk.
pub fn approx_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    std::cmp::max(1, chars.div_ceil(4))
}

/// First ~220 characters with whitespace collapsed
pub fn preview(content: &str) -> String {
    let mut out = String::with_capacity(PREVIEW_CHARS);
    let mut last_was_space = false;
    for ch in content.chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
        if out.chars().count() >= PREVIEW_CHARS {
            break;
        }
    }
    out.trim_end().to_string()
}

/// Chunk a document, dispatching on its file extension
pub fn build_document_chunks(content: &str, path: &str, title: &str) -> Vec<ChunkDraft> {
    match language::file_kind(path) {
        FileKind::Markdown => chunk_markdown(content, title),
        FileKind::Code { language, fence } => chunk_code(content, language, &fence, title),
    }
}
