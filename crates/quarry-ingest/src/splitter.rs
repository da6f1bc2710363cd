use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Chunk, Segment};

/// Separators tried in order by the recursive splitter; `""` splits into characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Sizes are measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns an error unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error unless `0 <= chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SplitError::OverlapTooLarge {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Fixed windows advancing by `chunk_size - chunk_overlap` characters.
    SlidingWindow,
    /// Split on paragraph, line, word, then character boundaries.
    Recursive,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
    strategy: SplitStrategy,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SplitterConfig, strategy: SplitStrategy) -> Result<Self, SplitError> {
        config.validate()?;
        Ok(Self { config, strategy })
    }

    #[must_use]
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    #[must_use]
    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;
        match self.strategy {
            SplitStrategy::SlidingWindow => sliding_window(text, chunk_size, chunk_overlap),
            SplitStrategy::Recursive => split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap),
        }
    }

    #[must_use]
    pub fn split(&self, segment: &Arc<Segment>) -> Vec<Chunk> {
        self.split_text(&segment.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                parent_segment: Arc::clone(segment),
                index,
            })
            .collect()
    }
}

/// Sliding-window chunking: windows of `chunk_size` characters starting every
/// `chunk_size - overlap` characters, trimmed, empty windows dropped.
///
/// # Errors
///
/// Returns an error unless `0 <= overlap < chunk_size`.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, SplitError> {
    SplitterConfig::new(chunk_size, overlap)?;
    Ok(sliding_window(text, chunk_size, overlap))
}

fn sliding_window(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_owned());
        }
        start += step;
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).collect()
    };

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) < chunk_size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
            pending.clear();
        }
        if finer.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_owned());
            }
        } else {
            chunks.extend(split_recursive(piece, finer, chunk_size, overlap));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
    }

    chunks
}

/// Greedily pack pieces (each shorter than `chunk_size`) into chunks, carrying
/// at most `overlap` characters of trailing pieces into the next chunk.
fn merge_pieces(pieces: &[&str], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    let joined_extra = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

    for &piece in pieces {
        let len = char_len(piece);
        if total + len + joined_extra(&window) > chunk_size {
            if !window.is_empty() {
                push_joined(&mut chunks, &window, separator);
            }
            while total > overlap
                || (total > 0 && total + len + joined_extra(&window) > chunk_size)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
            }
        }
        total += len + joined_extra(&window);
        window.push_back(piece);
    }

    push_joined(&mut chunks, &window, separator);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;

    fn recursive(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(SplitterConfig::new(size, overlap).unwrap(), SplitStrategy::Recursive)
            .unwrap()
    }

    #[test]
    fn sliding_window_starts() {
        let chunks = chunk("AAAAABBBBBCCCCC", 5, 2).unwrap();
        assert_eq!(chunks, vec!["AAAAA", "AABBB", "BBBBC", "BCCCC", "CCC"]);
    }

    #[test]
    fn sliding_window_trims_and_drops_blank_windows() {
        let chunks = chunk("ab   \n\n      cd", 4, 0).unwrap();
        assert_eq!(chunks, vec!["ab", "cd"]);
    }

    #[test]
    fn sliding_window_counts_characters_not_bytes() {
        let chunks = chunk("ééééé", 2, 0).unwrap();
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert_eq!(
            chunk("abc", 3, 3),
            Err(SplitError::OverlapTooLarge {
                chunk_size: 3,
                overlap: 3
            })
        );
        assert_eq!(chunk("abc", 0, 0), Err(SplitError::ZeroChunkSize));
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk("", 10, 2).unwrap().is_empty());
        assert!(recursive(10, 2).split_text("").is_empty());
    }

    #[test]
    fn recursive_prefers_paragraphs() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = recursive(30, 0).split_text(text);
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn recursive_small_text_is_single_chunk() {
        let chunks = recursive(500, 50).split_text("  short note  ");
        assert_eq!(chunks, vec!["short note"]);
    }

    #[test]
    fn recursive_falls_back_to_words() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = recursive(12, 0).split_text(text);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon"]);
    }

    #[test]
    fn recursive_overlap_repeats_trailing_words() {
        let text = "one two three four five six";
        let chunks = recursive(13, 5).split_text(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].rsplit(' ').next().unwrap();
            assert!(pair[1].starts_with(last_word), "{pair:?}");
        }
    }

    #[test]
    fn recursive_splits_long_words_into_characters() {
        let chunks = recursive(4, 0).split_text("abcdefghij");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(chunks.concat(), "abcdefghij");
    }

    #[test]
    fn chunks_reference_parent_segment() {
        let segment = Arc::new(Segment::text("a b c d e f g h", "notes"));
        let chunks = recursive(4, 0).split(&segment);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert!(Arc::ptr_eq(&c.parent_segment, &segment));
        }
    }

    #[test]
    fn invalid_config_rejected_by_constructor() {
        let config = SplitterConfig {
            chunk_size: 10,
            chunk_overlap: 20,
        };
        assert!(TextSplitter::new(config, SplitStrategy::SlidingWindow).is_err());
    }

    /// Each chunk must occur in `text` at or after the previous chunk's position.
    fn assert_in_order(text: &str, chunks: &[String]) -> Result<(), String> {
        let mut from = 0;
        for c in chunks {
            match text[from..].find(c.as_str()) {
                Some(pos) => from += pos,
                None => return Err(format!("{c:?} not found after byte {from}")),
            }
        }
        Ok(())
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        fn sizes() -> impl Strategy<Value = (usize, usize)> {
            (1usize..200).prop_flat_map(|size| (Just(size), 0..size))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn sliding_chunks_bounded(content in "\\PC{0,2000}", (size, overlap) in sizes()) {
                let chunks = chunk(&content, size, overlap).unwrap();
                for c in &chunks {
                    prop_assert!(c.chars().count() <= size);
                    prop_assert!(!c.is_empty());
                }
            }

            #[test]
            fn recursive_chunks_bounded(content in "[a-z \n]{0,2000}", (size, overlap) in sizes()) {
                let chunks = recursive(size, overlap).split_text(&content);
                for c in &chunks {
                    prop_assert!(c.chars().count() <= size);
                    prop_assert!(!c.trim().is_empty());
                }
            }

            #[test]
            fn sliding_preserves_order(content in "[a-z .\n]{1,1000}", (size, overlap) in sizes()) {
                let chunks = chunk(&content, size, overlap).unwrap();
                prop_assert!(assert_in_order(&content, &chunks).is_ok());
            }

            #[test]
            fn recursive_preserves_order(content in "[a-z .\n]{1,1000}", (size, overlap) in sizes()) {
                let chunks = recursive(size, overlap).split_text(&content);
                prop_assert!(assert_in_order(&content, &chunks).is_ok());
            }

            #[test]
            fn nonblank_text_yields_chunks(content in "[a-z]{1,500}", (size, overlap) in sizes()) {
                prop_assert!(!chunk(&content, size, overlap).unwrap().is_empty());
                prop_assert!(!recursive(size, overlap).split_text(&content).is_empty());
            }
        }
    }
}
