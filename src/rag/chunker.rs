//! Splits documents into passages for the knowledge store.
//!
//! Text is split on paragraph breaks first, then line breaks, then spaces;
//! adjacent pieces are packed back together up to `max_chars`. A single word
//! longer than the limit is cut on char boundaries.

use uuid::Uuid;

const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

/// Passage produced by the chunker.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Point id in the vector store
    pub id: Uuid,
    pub text: String,
    /// Source label (file name, URL, ...)
    pub source: String,
    /// Position within the source document
    pub index: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source: source.into(),
            index,
        }
    }
}

/// Character-budget splitter.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into chunks tagged with `source`.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        self.split(text, SEPARATORS)
            .into_iter()
            .enumerate()
            .map(|(index, piece)| Chunk::new(piece, source, index))
            .collect()
    }

    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some((separator, finer)) = separators.split_first() else {
            return self.hard_split(text);
        };

        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for piece in text.split(separator).map(str::trim).filter(|p| !p.is_empty()) {
            let piece_len = piece.chars().count();

            if piece_len > self.max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                out.extend(self.split(piece, finer));
                continue;
            }

            let joined_len = if current.is_empty() {
                piece_len
            } else {
                current_len + separator.chars().count() + piece_len
            };

            if joined_len > self.max_chars {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if !current.is_empty() {
                current.push_str(separator);
                current_len += separator.chars().count();
            }
            current.push_str(piece);
            current_len += piece_len;
        }

        if !current.is_empty() {
            out.push(current);
        }
        out
    }

    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.max_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}
