pub struct ChunkerConfig {
    /// Paragraphs shorter than this (after trimming) are dropped as noise
    pub min_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 20,
        }
    }
}

/// Splits extracted document text into paragraph-level chunks.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.split_by_paragraphs(text)
            .into_iter()
            .filter(|p| p.chars().count() >= self.config.min_chunk_chars)
            .collect()
    }

    fn split_by_paragraphs(&self, text: &str) -> Vec<String> {
        // Normalize Windows line endings so "\r\n\r\n" counts as a break
        let normalized = text.replace("\r\n", "\n");

        normalized
            .split("\n\n")
            .map(|s| Self::join_lines(s.trim()))
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Scanned reports wrap lines mid-sentence; fold them back into one line.
    fn join_lines(paragraph: &str) -> String {
        paragraph
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
