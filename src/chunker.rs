//! Token-bounded text chunking.
//!
//! [`TextChunker`] splits oversized text into [`Chunk`]s that each fit the
//! tokenizer's limit. Splitting is recursive and balanced: a chunk that is
//! too large is cut at the separator boundary closest to its token midpoint,
//! trying coarse separators (paragraphs) before fine ones (words), and
//! falling back to a character midpoint when no separator applies.
//! Separators stay attached to the piece they end, so concatenating the
//! untrimmed pieces reproduces the input.

use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::tokenizer::Tokenizer;

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// A slice of oversized text plus its averaging weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text.
    pub value: String,
    /// Character length of `value`.
    pub length: usize,
}

impl Chunk {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let length = value.chars().count();
        Self { value, length }
    }
}

/// Splits text into chunks of at most `max_tokens` tokens.
#[derive(Clone)]
pub struct TextChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    separators: Vec<String>,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("max_tokens", &self.max_tokens)
            .field("separators", &self.separators)
            .finish()
    }
}

impl TextChunker {
    /// Create a chunker bounded by the tokenizer's own `max_tokens`.
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        let max_tokens = tokenizer.max_tokens();
        Self::with_max_tokens(tokenizer, max_tokens)
    }

    /// Create a chunker with an explicit token limit.
    pub fn with_max_tokens(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(RagError::ConfigError(
                "chunker max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            tokenizer,
            max_tokens,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator hierarchy.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .collect();
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let mut pieces = Vec::new();
        self.chunk_recursively(text, 0, &mut pieces);

        pieces
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Chunk::new)
            .collect()
    }

    fn chunk_recursively<'a>(&self, chunk: &'a str, first_separator: usize, out: &mut Vec<&'a str>) {
        let token_count = self.tokenizer.count_tokens(chunk);
        if token_count <= self.max_tokens {
            out.push(chunk);
            return;
        }

        let half = token_count / 2;

        for (offset, separator) in self.separators[first_separator.min(self.separators.len())..]
            .iter()
            .enumerate()
        {
            let pieces: Vec<&str> = chunk
                .split_inclusive(separator.as_str())
                .filter(|p| !p.is_empty())
                .collect();
            if pieces.len() < 2 {
                continue;
            }

            // Cut after the piece whose running token count lands closest
            // to the midpoint; the last piece is excluded so both halves
            // are non-empty.
            let mut running = 0usize;
            let mut balance_index = 0usize;
            let mut balance_diff = usize::MAX;
            for (index, piece) in pieces[..pieces.len() - 1].iter().enumerate() {
                running += self.tokenizer.count_tokens(piece);
                let diff = running.abs_diff(half);
                if diff < balance_diff {
                    balance_index = index;
                    balance_diff = diff;
                }
            }

            let cut: usize = pieces[..=balance_index].iter().map(|p| p.len()).sum();
            let level = first_separator + offset;
            self.chunk_recursively(&chunk[..cut], level, out);
            self.chunk_recursively(&chunk[cut..], level, out);
            return;
        }

        let char_count = chunk.chars().count();
        if char_count < 2 {
            // A single character over budget cannot be split further.
            out.push(chunk);
            return;
        }
        let mid = chunk
            .char_indices()
            .nth(char_count / 2)
            .map(|(i, _)| i)
            .unwrap_or(chunk.len());
        let exhausted = self.separators.len();
        self.chunk_recursively(&chunk[..mid], exhausted, out);
        self.chunk_recursively(&chunk[mid..], exhausted, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::SimpleTokenizer;

    fn chunker(max_tokens: usize) -> TextChunker {
        let tokenizer = Arc::new(SimpleTokenizer::new(1, max_tokens).unwrap());
        TextChunker::new(tokenizer).unwrap()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(100).chunk("Short text.");
        assert_eq!(chunks, vec![Chunk::new("Short text.")]);
        assert_eq!(chunks[0].length, 11);
    }

    #[test]
    fn test_every_chunk_fits() {
        let text = "One two three. Four five six. Seven eight nine.\n\nTen eleven twelve.";
        let c = chunker(12);
        let chunks = c.chunk(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.length <= 12, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "aaaa aaaa\n\nbbbb bbbb";
        let chunks = chunker(10).chunk(text);
        assert_eq!(
            chunks.iter().map(|c| c.value.as_str()).collect::<Vec<_>>(),
            vec!["aaaa aaaa", "bbbb bbbb"]
        );
    }

    #[test]
    fn test_content_preserved_modulo_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunker(16).chunk(text);
        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.value.split_whitespace())
            .collect();
        assert_eq!(rejoined, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunks = chunker(10).chunk(&text);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.iter().map(|c| c.length).sum::<usize>(), 25);
    }

    #[test]
    fn test_multibyte_split_is_char_safe() {
        let text = "é".repeat(9);
        let chunks = chunker(4).chunk(&text);
        assert_eq!(chunks.iter().map(|c| c.length).sum::<usize>(), 9);
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let tokenizer = Arc::new(SimpleTokenizer::new(1, 10).unwrap());
        assert!(matches!(
            TextChunker::with_max_tokens(tokenizer, 0),
            Err(RagError::ConfigError(_))
        ));
    }

    #[test]
    fn test_custom_separators() {
        let text = "a|b|c|d";
        let chunks = chunker(3).with_separators(["|"]).chunk(text);
        for chunk in &chunks {
            assert!(chunk.length <= 3);
        }
        assert!(chunks.len() >= 2);
    }
}
