//! Content preprocessing for embedding generation.
//!
//! Prepares a record body for embedding:
//! 1. Trim whitespace
//! 2. Skip if empty (empty content is never indexed)
//! 3. Truncate to max length with ellipsis

use crate::records::Record;

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 2048;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Text embedded for `record`, or `None` when its content is blank.
pub fn preprocess_content(record: &Record) -> Option<String> {
    let content = record.content.trim();

    if content.is_empty() {
        return None;
    }

    Some(truncate_content(content))
}

fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str) -> Record {
        Record {
            id: "1".to_string(),
            title: "title is not embedded".to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_content_returns_none() {
        assert!(preprocess_content(&record("")).is_none());
        assert!(preprocess_content(&record(" \n\t ")).is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(
            preprocess_content(&record("  error en cuota \n")),
            Some("error en cuota".to_string())
        );
    }

    #[test]
    fn test_truncation_counts_characters() {
        let long_content = "ñ".repeat(3000);
        let content = preprocess_content(&record(&long_content)).unwrap();

        assert_eq!(content.chars().count(), MAX_CONTENT_LENGTH);
        assert!(content.ends_with(TRUNCATION_SUFFIX));
    }
}
