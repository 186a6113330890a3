//! Recursive character text splitter
//!
//! Text is split on the first separator that occurs in it (paragraph,
//! line, space, then single characters). Pieces are merged back into chunks
//! of at most `chunk_size` characters, with roughly `chunk_overlap`
//! characters carried from the end of one chunk into the next. Pieces that
//! are still too long are split again with the next separator.

use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits documents into overlapping chunks
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Create a splitter; `chunk_overlap` is clamped below `chunk_size`
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::ingest::TextSplitter;
    ///
    /// let splitter = TextSplitter::new(10, 0);
    /// let chunks = splitter.split("alpha beta gamma delta");
    /// assert_eq!(chunks, vec!["alpha beta", "gamma", "delta"]);
    /// ```
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split `text` into trimmed, non-empty chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() || text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }
            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, separator));
                short_pieces.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |total: usize, current: &VecDeque<&str>| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(total, &current) > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current, separator);
                while total > self.chunk_overlap
                    || (joined_len(total, &current) > self.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { separator_len };
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(1000, 100);
        assert_eq!(splitter.split("Hello world."), vec!["Hello world."]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let splitter = TextSplitter::new(1000, 100);
        assert!(splitter.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraphs_preferred_over_words() {
        let splitter = TextSplitter::new(20, 0);
        let chunks = splitter.split("first paragraph\n\nsecond paragraph");
        assert_eq!(chunks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        let splitter = TextSplitter::new(100, 20);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_overlap_repeats_trailing_words() {
        let splitter = TextSplitter::new(12, 6);
        let chunks = splitter.split("aaa bbb ccc ddd eee");
        assert_eq!(chunks, vec!["aaa bbb ccc", "ccc ddd eee"]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0);
        let chunks = splitter.split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_overlap_is_clamped() {
        let splitter = TextSplitter::new(5, 50);
        assert_eq!(splitter.chunk_overlap, 4);
    }
}
