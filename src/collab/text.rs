//! Plain-text parser with overlapping character windows.

use std::fs;

use super::{Fragment, ParsedDocument, Parser};
use crate::error::CollabError;
use crate::storage::{FileRecord, FileType, Metadata, MetadataValue};
use crate::Result;

/// Reads UTF-8 text files and splits them into overlapping fragments.
///
/// Files whose type is not [`FileType::Text`] yield no fragments.
#[derive(Debug, Clone)]
pub struct TextParser {
    chunk_size: usize,
    overlap: usize,
}

impl TextParser {
    /// Create a parser producing windows of `chunk_size` characters that
    /// overlap by `overlap` characters.
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split `content` into windows, preferring to end a window at a
    /// newline or space in its last quarter.
    #[must_use]
    pub fn split(&self, content: &str) -> Vec<String> {
        let chars: Vec<char> = content.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }
        if chars.len() <= self.chunk_size {
            return vec![content.to_string()];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = self.window_end(&chars, start);
            windows.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }
        windows
    }

    fn window_end(&self, chars: &[char], start: usize) -> usize {
        let hard_end = (start + self.chunk_size).min(chars.len());
        if hard_end == chars.len() {
            return hard_end;
        }

        let soft_start = hard_end - self.chunk_size / 4;
        (soft_start.max(start + 1)..hard_end)
            .rev()
            .find(|&i| chars[i] == '\n')
            .or_else(|| {
                (soft_start.max(start + 1)..hard_end)
                    .rev()
                    .find(|&i| chars[i].is_whitespace())
            })
            .map_or(hard_end, |i| i + 1)
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Parser for TextParser {
    fn parse(&self, record: &FileRecord) -> Result<ParsedDocument> {
        if record.file_type != FileType::Text {
            return Ok(ParsedDocument::default());
        }

        let bytes = fs::read(&record.path).map_err(|e| CollabError::Parse {
            path: record.path.clone(),
            reason: e.to_string(),
        })?;
        let content = String::from_utf8(bytes).map_err(|e| CollabError::Parse {
            path: record.path.clone(),
            reason: format!("not valid UTF-8: {e}"),
        })?;

        let fragments: Vec<Fragment> = self
            .split(&content)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Fragment {
                file_id: record.id.clone(),
                path: record.path.clone(),
                index,
                content: text,
                metadata: Metadata::new(),
            })
            .collect();

        let mut metadata = Metadata::new();
        metadata.insert(
            "line_count".into(),
            MetadataValue::Int(i64::try_from(content.lines().count()).unwrap_or(i64::MAX)),
        );
        metadata.insert(
            "char_count".into(),
            MetadataValue::Int(i64::try_from(content.chars().count()).unwrap_or(i64::MAX)),
        );

        tracing::trace!(path = %record.path, fragments = fragments.len(), "Parsed text file");
        Ok(ParsedDocument {
            fragments,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_small_content_is_one_fragment() {
        let parser = TextParser::new(100, 10);
        assert_eq!(parser.split("hello world"), vec!["hello world".to_string()]);
        assert!(parser.split("").is_empty());
    }

    #[test]
    fn test_windows_overlap_and_cover_content() {
        let parser = TextParser::new(10, 3);
        let content = "abcdefghijklmnopqrstuvwxyz";
        let windows = parser.split(content);

        assert!(windows.len() > 2);
        assert!(windows.iter().all(|w| w.chars().count() <= 10));
        assert!(windows[0].starts_with('a'));
        assert!(windows.last().unwrap().ends_with('z'));
        // consecutive windows share the overlap
        let tail: String = windows[0].chars().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(windows[1].starts_with(&tail));
    }

    #[test]
    fn test_prefers_newline_breaks() {
        let parser = TextParser::new(12, 0);
        let windows = parser.split("first line\nsecond line\nthird");
        assert_eq!(windows[0], "first line\n");
    }

    #[test]
    fn test_multibyte_content() {
        let parser = TextParser::new(4, 1);
        let windows = parser.split("héllo wörld ünïcode");
        assert!(windows.iter().all(|w| w.chars().count() <= 4));
    }

    #[test]
    fn test_parse_text_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "one\ntwo\nthree").unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        let parsed = TextParser::default().parse(&record).unwrap();

        assert_eq!(parsed.fragments.len(), 1);
        assert_eq!(parsed.fragments[0].file_id, record.id);
        assert_eq!(parsed.metadata.get("line_count"), Some(&MetadataValue::Int(3)));
    }

    #[test]
    fn test_parse_non_text_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.png");
        fs::write(&path, [0_u8, 159, 146, 150]).unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        let parsed = TextParser::default().parse(&record).unwrap();
        assert!(parsed.fragments.is_empty());
    }

    #[test]
    fn test_parse_invalid_utf8_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.txt");
        fs::write(&path, [0_u8, 159, 146, 150]).unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        assert!(TextParser::default().parse(&record).is_err());
    }

    #[test]
    fn test_parse_missing_file_is_error() {
        let record = FileRecord::new("/nonexistent/dir/a.txt");
        assert!(TextParser::default().parse(&record).is_err());
    }
}
