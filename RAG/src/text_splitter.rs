use crate::models::{Chunk, Document};
use anyhow::Result;
use std::collections::VecDeque;

/// Paragraph, line, word, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text into chunks of at most `chunk_size` characters, preferring to
/// cut at the coarsest separator that occurs in the text and recursing into
/// finer separators only for pieces that are still too long. Consecutive
/// chunks share up to `chunk_overlap` trailing characters.
///
/// Lengths are counted in `char`s, not bytes.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(
            chunk_size,
            chunk_overlap,
            DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: Vec<String>,
    ) -> Result<Self> {
        anyhow::ensure!(chunk_size > 0, "chunk size must be positive");
        anyhow::ensure!(
            chunk_overlap < chunk_size,
            "chunk overlap ({}) must be smaller than chunk size ({})",
            chunk_overlap,
            chunk_size
        );

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits every document in order; each chunk inherits its page's metadata.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.page_content)
                    .into_iter()
                    .map(move |text| Chunk {
                        page_content: text,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator: &str = "";
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if finer.is_empty() {
                final_chunks.extend(self.hard_cut(piece));
            } else {
                final_chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Greedily packs pieces (each shorter than `chunk_size`) into chunks and
    /// carries a tail of at most `chunk_overlap` characters into the next one.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_and_strip(&current) {
                    chunks.push(chunk);
                }

                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match current.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        if let Some(chunk) = join_and_strip(&current) {
            chunks.push(chunk);
        }

        chunks
    }

    /// Last resort for a piece with no separator left to split on.
    fn hard_cut(&self, piece: &str) -> Vec<String> {
        let chars: Vec<char> = piece.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Splits `text` before every occurrence of `separator`, so each piece after
/// the first starts with the separator. An empty separator yields characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_and_strip(pieces: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = pieces.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    /// Space separated words that are unique, so every chunk can be located
    /// unambiguously in the source text.
    fn numbered_words(prefix: &str, min_chars: usize) -> String {
        let mut text = String::new();
        let mut i = 0;
        while text.chars().count() < min_chars {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("{}w{}", prefix, i));
            i += 1;
        }
        text
    }

    fn page(text: &str, page: u32) -> Document {
        Document {
            page_content: text.to_string(),
            metadata: DocumentMetadata {
                source: "pdf/report.pdf".to_string(),
                page,
            },
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = RecursiveCharacterTextSplitter::new(1024, 80).unwrap();
        let chunks = splitter.split_text("  A short page of text.  ");
        assert_eq!(chunks, vec!["A short page of text.".to_string()]);
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        let splitter = RecursiveCharacterTextSplitter::new(1024, 80).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n ").is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let splitter = RecursiveCharacterTextSplitter::new(20, 0).unwrap();
        let chunks = splitter.split_text("aaaa bbbb cccc\n\ndddd eeee ffff");
        assert_eq!(chunks, vec!["aaaa bbbb cccc", "dddd eeee ffff"]);
    }

    #[test]
    fn long_paragraph_falls_back_to_words() {
        let splitter = RecursiveCharacterTextSplitter::new(12, 0).unwrap();
        let chunks = splitter.split_text("one two three four five six\n\nseven");
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        // No word is ever cut in half when a space is available.
        for chunk in &chunks {
            for word in chunk.split(' ') {
                assert!(
                    ["one", "two", "three", "four", "five", "six", "seven"].contains(&word),
                    "unexpected fragment {:?}",
                    word
                );
            }
        }
    }

    #[test]
    fn hard_cut_only_without_separators() {
        let splitter = RecursiveCharacterTextSplitter::new(10, 2).unwrap();
        let word = "abcdefghijklmnopqrstuvwxy";
        let chunks = splitter.split_text(word);
        assert_eq!(chunks[0], "abcdefghij");
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks.last().unwrap().ends_with('y'));
    }

    #[test]
    fn oversized_piece_is_cut_when_separators_run_out() {
        let splitter =
            RecursiveCharacterTextSplitter::with_separators(5, 0, vec![" ".to_string()]).unwrap();
        let chunks = splitter.split_text("abc defghijklmnop");
        assert_eq!(chunks, vec!["abc", "defg", "hijkl", "mnop"]);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = RecursiveCharacterTextSplitter::new(50, 10).unwrap();
        let text = numbered_words("", 300);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].split(' ').any(|w| w == first_word),
                "{:?} does not continue from {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn chunks_cover_the_whole_text_without_exceeding_the_limit() {
        let splitter = RecursiveCharacterTextSplitter::new(100, 15).unwrap();
        let text = numbered_words("x", 1500);
        let chunks = splitter.split_text(&text);

        let mut covered_to = 0;
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
            let start = text.find(chunk.as_str()).expect("chunk is a slice of the source");
            // Only the separating space may be skipped between neighbours.
            assert!(start <= covered_to + 1, "gap before {:?}", chunk);
            covered_to = covered_to.max(start + chunk.len());
        }
        assert_eq!(covered_to, text.len());
    }

    #[test]
    fn splitting_is_deterministic() {
        let splitter = RecursiveCharacterTextSplitter::new(64, 8).unwrap();
        let text = format!("{}\n\n{}", numbered_words("a", 400), numbered_words("b", 300));
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let splitter = RecursiveCharacterTextSplitter::new(6, 0).unwrap();
        let chunks = splitter.split_text("ééééé ööööö");
        assert_eq!(chunks, vec!["ééééé", "ööööö"]);
    }

    #[test]
    fn three_pages_of_body_text() {
        let splitter = RecursiveCharacterTextSplitter::new(1024, 80).unwrap();
        let pages: Vec<Document> = (0..3)
            .map(|n| page(&numbered_words(&format!("p{}", n), 2500), n))
            .collect();

        let chunks = splitter.split_documents(&pages);

        // ceil(2500 / (1024 - 80)) chunks per page
        assert_eq!(chunks.len(), 9);
        assert!(chunks.iter().all(|c| c.page_content.chars().count() <= 1024));
        let page_numbers: Vec<u32> = chunks.iter().map(|c| c.metadata.page).collect();
        assert_eq!(page_numbers, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
        assert!(chunks.iter().all(|c| c.metadata.source == "pdf/report.pdf"));
    }

    #[test]
    fn more_text_never_means_fewer_chunks() {
        let splitter = RecursiveCharacterTextSplitter::new(200, 20).unwrap();
        let mut previous = 0;
        for size in [0, 50, 199, 400, 800, 1600, 3200] {
            let text = numbered_words("m", size);
            let count = splitter.split_text(&text).len();
            assert!(count >= previous, "{} chars gave {} < {}", size, count, previous);
            previous = count;
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        assert!(RecursiveCharacterTextSplitter::new(10, 11).is_err());
        assert!(RecursiveCharacterTextSplitter::new(10, 10).is_err());
        assert!(RecursiveCharacterTextSplitter::new(0, 0).is_err());
        assert!(RecursiveCharacterTextSplitter::new(10, 9).is_ok());
    }
}
