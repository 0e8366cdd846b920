//! Splitting strategies and chunk assembly.
//!
//! Three strategies are supported over the same size/overlap parameters:
//!
//! - `recursive`: split on successively finer separators (paragraph break,
//!   line break, space, character boundary), preferring the coarsest boundary
//!   that keeps each piece within the chunk budget.
//! - `token`: split on a token-count budget using the `cl100k_base` encoding,
//!   with a sliding token-window overlap.
//! - `character`: split purely on a fixed separator (default newline).
//!
//! Sizes and overlaps are measured in characters for the character-based
//! strategies and in tokens for the token strategy. Adjacent chunks overlap by
//! repeating up to `chunk_overlap` trailing units of the previous chunk.

use crate::loader::LoadedDocument;
use crate::model::{DocumentChunk, current_timestamp_rfc3339, generate_id};
use anyhow::Error as TokenizerError;
use serde_json::{Map, Value};
use thiserror::Error;
use tiktoken_rs::cl100k_base;

/// Separator hierarchy tried in priority order by the recursive strategy.
const RECURSIVE_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Default separator for the character strategy.
const CHARACTER_SEPARATOR: &str = "\n";

/// Errors produced while turning logical documents into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunk size must be a positive number of characters or tokens.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must remain strictly smaller than the chunk size.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured chunk size.
        chunk_size: usize,
        /// Configured overlap.
        overlap: usize,
    },
    /// Tokenizer resources were unavailable for the token strategy.
    #[error("tokenizer failure: {source}")]
    Tokenizer {
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Closed set of selectable splitting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkingStrategy {
    /// Separator-hierarchy splitting with hard character-cut fallback.
    #[default]
    Recursive,
    /// Token-budget splitting with a sliding token window.
    Token,
    /// Fixed-separator splitting (newline).
    Character,
}

impl ChunkingStrategy {
    /// Parse a strategy tag, falling back to `recursive` on unknown input.
    ///
    /// The fallback is deliberate and non-fatal; a warning is emitted so
    /// misconfigured callers remain visible in the logs.
    pub fn parse_or_default(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "recursive" => Self::Recursive,
            "token" => Self::Token,
            "character" => Self::Character,
            other => {
                tracing::warn!(
                    strategy = other,
                    "Unknown chunking strategy; falling back to recursive"
                );
                Self::Recursive
            }
        }
    }

    /// Lowercase tag used in logs and metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recursive => "recursive",
            Self::Token => "token",
            Self::Character => "character",
        }
    }
}

/// Split logical documents into the ordered sequence of [`DocumentChunk`].
///
/// Chunk indexes restart at 0 for each logical document. Each chunk's metadata
/// is the union of the loader's per-document metadata, the caller-supplied
/// metadata, the file-format tag, the chunk index, and the originating
/// document's position.
pub fn create_chunks(
    documents: &[LoadedDocument],
    strategy: ChunkingStrategy,
    chunk_size: usize,
    chunk_overlap: usize,
    source: &str,
    file_type: &str,
    extra_metadata: &Map<String, Value>,
) -> Result<Vec<DocumentChunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            overlap: chunk_overlap,
        });
    }

    tracing::info!(
        strategy = strategy.as_str(),
        chunk_size,
        chunk_overlap,
        documents = documents.len(),
        "Creating chunks"
    );

    let mut chunks = Vec::new();
    for (document_index, document) in documents.iter().enumerate() {
        let pieces = split_text(&document.content, strategy, chunk_size, chunk_overlap)?;

        for (chunk_index, content) in pieces.into_iter().enumerate() {
            let mut metadata = document.metadata.clone();
            for (key, value) in extra_metadata {
                metadata.insert(key.clone(), value.clone());
            }
            metadata.insert("file_type".into(), Value::String(file_type.to_string()));
            metadata.insert("chunk_index".into(), Value::from(chunk_index));
            metadata.insert("document_index".into(), Value::from(document_index));

            let now = current_timestamp_rfc3339();
            chunks.push(DocumentChunk {
                id: generate_id(),
                content,
                metadata,
                embedding: None,
                source: source.to_string(),
                file_type: file_type.to_string(),
                chunk_index,
                created_at: now.clone(),
                updated_at: now,
            });
        }
    }

    tracing::debug!(chunks = chunks.len(), "Chunks created");
    Ok(chunks)
}

/// Split one document's text according to the selected strategy.
fn split_text(
    text: &str,
    strategy: ChunkingStrategy,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            overlap: chunk_overlap,
        });
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    match strategy {
        ChunkingStrategy::Recursive => Ok(split_recursive(
            text,
            &RECURSIVE_SEPARATORS,
            chunk_size,
            chunk_overlap,
        )),
        ChunkingStrategy::Token => split_tokens(text, chunk_size, chunk_overlap),
        ChunkingStrategy::Character => Ok(split_character(text, chunk_size, chunk_overlap)),
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on a separator, dropping empty fragments. An empty separator splits
/// into individual characters (the hard-cut fallback).
fn split_on_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Recursive separator-hierarchy splitter.
///
/// Picks the first separator present in the text, splits on it, and greedily
/// merges fragments back up to the chunk budget. Oversized fragments are
/// re-split with the remaining, finer separators; the empty-string separator
/// guarantees termination via a hard character cut.
fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let mut separator = *separators.last().unwrap_or(&"");
    let mut remaining: &[&str] = &[];
    for (index, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() || text.contains(candidate) {
            separator = candidate;
            remaining = &separators[index + 1..];
            break;
        }
    }

    let mut final_chunks = Vec::new();
    let mut good_splits: Vec<String> = Vec::new();

    for piece in split_on_separator(text, separator) {
        if char_len(&piece) < chunk_size {
            good_splits.push(piece);
        } else {
            if !good_splits.is_empty() {
                final_chunks.extend(merge_splits(
                    &good_splits,
                    separator,
                    chunk_size,
                    chunk_overlap,
                ));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.extend(hard_cut(&piece, chunk_size));
            } else {
                final_chunks.extend(split_recursive(&piece, remaining, chunk_size, chunk_overlap));
            }
        }
    }

    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(
            &good_splits,
            separator,
            chunk_size,
            chunk_overlap,
        ));
    }

    final_chunks
}

/// Fixed-separator splitter without the recursive hierarchy.
fn split_character(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut mergeable: Vec<String> = Vec::new();

    for piece in split_on_separator(text, CHARACTER_SEPARATOR) {
        if char_len(&piece) < chunk_size {
            mergeable.push(piece);
        } else {
            if !mergeable.is_empty() {
                chunks.extend(merge_splits(
                    &mergeable,
                    CHARACTER_SEPARATOR,
                    chunk_size,
                    chunk_overlap,
                ));
                mergeable.clear();
            }
            chunks.extend(hard_cut(&piece, chunk_size));
        }
    }

    if !mergeable.is_empty() {
        chunks.extend(merge_splits(
            &mergeable,
            CHARACTER_SEPARATOR,
            chunk_size,
            chunk_overlap,
        ));
    }

    chunks
}

/// Cut a fragment into fixed-size character windows.
fn hard_cut(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

/// Greedily merge fragments into chunks bounded by `chunk_size`, keeping a
/// trailing window of fragments so adjacent chunks overlap by up to
/// `chunk_overlap` characters.
fn merge_splits(
    splits: &[String],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut total = 0usize;

    for piece in splits {
        let piece_len = char_len(piece);
        let join_len = if current.is_empty() { 0 } else { separator_len };

        if total + piece_len + join_len > chunk_size && !current.is_empty() {
            if let Some(doc) = join_fragments(&current, separator) {
                docs.push(doc);
            }
            // Shrink the window until the overlap budget holds and the next
            // fragment fits.
            while total > chunk_overlap
                || (total + piece_len + if current.is_empty() { 0 } else { separator_len }
                    > chunk_size
                    && total > 0)
            {
                let first_len = char_len(&current[0]);
                total -= first_len + if current.len() > 1 { separator_len } else { 0 };
                current.remove(0);
            }
        }

        total += piece_len + if current.is_empty() { 0 } else { separator_len };
        current.push(piece.clone());
    }

    if let Some(doc) = join_fragments(&current, separator) {
        docs.push(doc);
    }

    docs
}

fn join_fragments(fragments: &[String], separator: &str) -> Option<String> {
    let joined = fragments.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Token-budget splitter over the `cl100k_base` encoding.
///
/// Produces windows of at most `chunk_size` tokens with a stride of
/// `chunk_size - chunk_overlap` tokens.
fn split_tokens(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer { source })?;
    let tokens = encoding.encode_ordinary(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let stride = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < tokens.len() {
        let end = (start + chunk_size).min(tokens.len());
        let window = tokens[start..end].to_vec();
        let decoded = encoding
            .decode(window)
            .map_err(|source| ChunkingError::Tokenizer { source })?;
        if !decoded.trim().is_empty() {
            chunks.push(decoded);
        }
        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> LoadedDocument {
        let mut metadata = Map::new();
        metadata.insert("source".into(), Value::String("test.txt".into()));
        LoadedDocument {
            content: content.to_string(),
            metadata,
        }
    }

    #[test]
    fn recursive_splits_on_paragraph_boundaries() {
        let pieces = split_text("A.\n\nB.\n\nC.", ChunkingStrategy::Recursive, 5, 0).unwrap();
        assert_eq!(pieces, vec!["A.", "B.", "C."]);
        for piece in &pieces {
            assert!(char_len(piece) <= 5);
        }
    }

    #[test]
    fn recursive_respects_budget_and_overlap() {
        let pieces = split_text(
            "aaaa bbbb cccc dddd eeee",
            ChunkingStrategy::Recursive,
            10,
            4,
        )
        .unwrap();
        assert_eq!(
            pieces,
            vec!["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]
        );
        for piece in &pieces {
            assert!(char_len(piece) <= 10);
        }
        for pair in pieces.windows(2) {
            // The repeated fragment is a suffix of the previous chunk and a
            // prefix of the next.
            let shared = pair[1].split(' ').next().unwrap();
            assert!(pair[0].ends_with(shared));
        }
    }

    #[test]
    fn recursive_hard_cuts_unbroken_text() {
        let pieces = split_text(&"x".repeat(12), ChunkingStrategy::Recursive, 5, 0).unwrap();
        assert_eq!(pieces, vec!["xxxxx", "xxxxx", "xx"]);
    }

    #[test]
    fn character_strategy_splits_on_newlines() {
        let pieces = split_text("a\nb\nc", ChunkingStrategy::Character, 1, 0).unwrap();
        assert_eq!(pieces, vec!["a", "b", "c"]);

        let merged = split_text("line1\nline2", ChunkingStrategy::Character, 12, 0).unwrap();
        assert_eq!(merged, vec!["line1\nline2"]);
    }

    #[test]
    fn token_strategy_reassembles_without_overlap() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let pieces = split_text(text, ChunkingStrategy::Token, 3, 0).unwrap();
        assert!(pieces.len() > 1);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn token_strategy_bounds_window_size() {
        let encoding = cl100k_base().unwrap();
        let text = "one two three four five six seven eight nine ten";
        let pieces = split_text(text, ChunkingStrategy::Token, 4, 1).unwrap();
        for piece in &pieces {
            assert!(encoding.encode_ordinary(piece).len() <= 4);
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let pieces = split_text("   \n  ", ChunkingStrategy::Recursive, 10, 0).unwrap();
        assert!(pieces.is_empty());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let error = split_text("hello", ChunkingStrategy::Recursive, 0, 0)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));

        let error = create_chunks(
            &[doc("hello")],
            ChunkingStrategy::Recursive,
            5,
            5,
            "test.txt",
            "text",
            &Map::new(),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidOverlap {
                chunk_size: 5,
                overlap: 5
            }
        ));
    }

    #[test]
    fn unknown_strategy_falls_back_to_recursive() {
        assert_eq!(
            ChunkingStrategy::parse_or_default("semantic"),
            ChunkingStrategy::Recursive
        );
        assert_eq!(
            ChunkingStrategy::parse_or_default(" Token "),
            ChunkingStrategy::Token
        );
    }

    #[test]
    fn chunk_index_resets_per_document() {
        let chunks = create_chunks(
            &[doc("A.\n\nB."), doc("C.\n\nD.")],
            ChunkingStrategy::Recursive,
            3,
            0,
            "test.txt",
            "text",
            &Map::new(),
        )
        .unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[2].chunk_index, 0);
        assert_eq!(chunks[3].chunk_index, 1);
        assert_eq!(
            chunks[2].metadata.get("document_index"),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn chunk_ids_are_unique_and_metadata_is_merged() {
        let mut extra = Map::new();
        extra.insert("author".into(), Value::String("jane".into()));

        let chunks = create_chunks(
            &[doc("first paragraph.\n\nsecond paragraph.")],
            ChunkingStrategy::Recursive,
            20,
            0,
            "test.txt",
            "text",
            &extra,
        )
        .unwrap();

        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());

        for chunk in &chunks {
            assert_eq!(
                chunk.metadata.get("author"),
                Some(&Value::String("jane".into()))
            );
            assert_eq!(
                chunk.metadata.get("source"),
                Some(&Value::String("test.txt".into()))
            );
            assert_eq!(
                chunk.metadata.get("file_type"),
                Some(&Value::String("text".into()))
            );
            assert_eq!(
                chunk.metadata.get("chunk_index"),
                Some(&Value::from(chunk.chunk_index))
            );
            assert!(chunk.embedding.is_none());
        }
    }

    #[test]
    fn chunking_is_idempotent_for_identical_inputs() {
        let documents = [doc("alpha beta gamma delta epsilon zeta")];
        let first = create_chunks(
            &documents,
            ChunkingStrategy::Recursive,
            12,
            4,
            "test.txt",
            "text",
            &Map::new(),
        )
        .unwrap();
        let second = create_chunks(
            &documents,
            ChunkingStrategy::Recursive,
            12,
            4,
            "test.txt",
            "text",
            &Map::new(),
        )
        .unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_ne!(a.id, b.id);
        }
    }
}
