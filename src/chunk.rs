//! Fixed-size overlapping text chunker.
//!
//! Splits normalized document text into windows of `chunk_size` characters.
//! Each window starts `chunk_size - overlap` characters after the previous
//! one, so the tail of a window is repeated at the head of the next. Sizes
//! count Unicode scalar values, not bytes.

use crate::models::Chunk;

/// Window parameters for [`chunk_document`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub max_chunks: Option<usize>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
            max_chunks: None,
        }
    }
}

/// Split text into overlapping windows, dropping windows that are blank.
///
/// The start of the next window always advances by at least one character,
/// so `overlap >= chunk_size` still terminates. `max_chunks` caps the number
/// of windows produced before the blank filter runs.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    max_chunks: Option<usize>,
) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let clean = normalized.trim();
    if clean.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = clean
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(clean.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let size = chunk_size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        windows.push(&clean[boundaries[start]..boundaries[end]]);

        if let Some(max) = max_chunks {
            if windows.len() >= max {
                break;
            }
        }
        if end >= char_count {
            break;
        }
        start += step;
    }

    windows
        .into_iter()
        .filter(|w| !w.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Chunk a document and tag every window with its source.
pub fn chunk_document(title: &str, path: &str, text: &str, options: &ChunkOptions) -> Vec<Chunk> {
    split_text(text, options.chunk_size, options.overlap, options.max_chunks)
        .into_iter()
        .map(|text| Chunk {
            text,
            source_title: title.to_string(),
            source_path: path.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 800, 100, None).is_empty());
        assert!(split_text("  \r\n\t ", 800, 100, None).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("  Hello, world!\r\n", 800, 100, None);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_windows_respect_size_and_overlap() {
        let text = sample(250);
        let chunks = split_text(&text, 100, 20, None);
        // starts at 0, 80, 160; the third window reaches the end
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - 20..].iter().collect();
            assert!(pair[1].starts_with(&tail));
        }
        assert!(text.ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn test_window_starts_advance_by_step() {
        let text = sample(1000);
        let chars: Vec<char> = text.chars().collect();
        let chunks = split_text(&text, 64, 16, None);
        for (k, c) in chunks.iter().enumerate() {
            let start = k * 48;
            let end = (start + 64).min(chars.len());
            let expected: String = chars[start..end].iter().collect();
            assert_eq!(c, &expected, "window {} starts at the wrong offset", k);
        }
        let last_start = (chunks.len() - 1) * 48;
        assert!(last_start + 64 >= chars.len());
    }

    #[test]
    fn test_crlf_normalized() {
        let chunks = split_text("line one\r\nline two", 800, 0, None);
        assert_eq!(chunks[0], "line one\nline two");
    }

    #[test]
    fn test_max_chunks_caps_output() {
        let text = sample(1000);
        let chunks = split_text(&text, 100, 10, Some(3));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_terminates() {
        let text = sample(30);
        let equal = split_text(&text, 10, 10, None);
        // advance clamped to one character
        assert_eq!(equal.len(), 21);
        let larger = split_text(&text, 10, 50, None);
        assert_eq!(larger.len(), 21);
        for c in &larger {
            assert_eq!(c.chars().count(), 10);
        }
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let text = "é".repeat(25);
        let chunks = split_text(&text, 10, 2, None);
        for c in &chunks {
            assert!(c.chars().all(|ch| ch == 'é'));
            assert!(c.chars().count() <= 10);
        }
    }

    #[test]
    fn test_blank_windows_dropped() {
        let text = format!("abc{}def", " ".repeat(30));
        let chunks = split_text(&text, 10, 0, None);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        assert_eq!(chunks[0], format!("abc{}", " ".repeat(7)));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_chunk_document_tags_source() {
        let chunks = chunk_document(
            "notes.txt",
            "/tmp/notes.txt",
            &sample(20),
            &ChunkOptions {
                chunk_size: 10,
                overlap: 0,
                max_chunks: None,
            },
        );
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.source_title == "notes.txt"));
        assert!(chunks.iter().all(|c| c.source_path == "/tmp/notes.txt"));
    }
}
