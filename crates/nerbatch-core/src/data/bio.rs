//! Reader for pre-tokenized BIO input: one token per line, whitespace
//! separated columns, a blank line between sentences.

use crate::data::{TestExample, Token};
use crate::error::{NerError, Result};
use crate::labels::OUTSIDE_LABEL;

/// Parse pre-tokenized BIO text into sentences.
///
/// With `has_offsets`, every token line is `text start end [.. tag]`.
/// Without it, a line is `text [.. tag]` and offsets are recomputed as if
/// tokens were joined by single spaces. The tag is the last column when the
/// line has more than the mandatory columns, otherwise the placeholder `O`.
pub fn parse_bio(content: &str, has_offsets: bool) -> Result<Vec<TestExample>> {
    let mandatory = if has_offsets { 3 } else { 1 };
    let mut examples = Vec::new();
    let mut current = Vec::new();
    let mut cursor = 0usize;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() {
            if !current.is_empty() {
                examples.push(TestExample::new(std::mem::take(&mut current)));
            }
            continue;
        }

        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < mandatory {
            return Err(NerError::MalformedInput {
                line: line_no,
                reason: format!(
                    "expected at least {mandatory} columns (text start end), found {}",
                    columns.len()
                ),
            });
        }

        let text = columns[0];
        let (start, end) = if has_offsets {
            let start = parse_offset(columns[1], line_no, "start")?;
            let end = parse_offset(columns[2], line_no, "end")?;
            if end < start {
                return Err(NerError::MalformedInput {
                    line: line_no,
                    reason: format!("end offset {end} precedes start offset {start}"),
                });
            }
            (start, end)
        } else {
            let start = cursor;
            (start, start + text.chars().count())
        };
        cursor = end + 1;

        let tag = if columns.len() > mandatory {
            columns[columns.len() - 1]
        } else {
            OUTSIDE_LABEL
        };

        current.push(Token::new(text, start, end, tag));
    }

    // Don't forget the last sentence
    if !current.is_empty() {
        examples.push(TestExample::new(current));
    }

    Ok(examples)
}

fn parse_offset(column: &str, line: usize, which: &str) -> Result<usize> {
    column.parse().map_err(|_| NerError::MalformedInput {
        line,
        reason: format!("{which} offset {column:?} is not a non-negative integer"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_offsets() {
        let content = "John 0 4 O\nlives 5 10 O\n\nParis 12 17 B-LOC\n";
        let examples = parse_bio(content, true).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].len(), 2);
        assert_eq!(examples[0].tokens[1].text, "lives");
        assert_eq!(examples[0].tokens[1].start, 5);
        assert_eq!(examples[0].tokens[1].end, 10);
        assert_eq!(examples[1].tokens[0].tag, "B-LOC");
    }

    #[test]
    fn test_offsets_without_tag_column() {
        let examples = parse_bio("John 0 4\nlives 5 10\n", true).unwrap();
        assert_eq!(examples[0].tokens[0].tag, "O");
    }

    #[test]
    fn test_extra_columns_take_last_as_tag() {
        let examples = parse_bio("John 0 4 0 4 B-PER\n", true).unwrap();
        assert_eq!(examples[0].tokens[0].tag, "B-PER");
        assert_eq!(examples[0].tokens[0].end, 4);
    }

    #[test]
    fn test_recomputed_offsets() {
        let content = "John\tB-PER\nlives\tO\n\nin\tO\n";
        let examples = parse_bio(content, false).unwrap();

        let spans: Vec<(usize, usize)> = examples
            .iter()
            .flat_map(|e| e.tokens.iter().map(|t| (t.start, t.end)))
            .collect();
        assert_eq!(spans, vec![(0, 4), (5, 10), (11, 13)]);
        assert_eq!(examples[0].tokens[0].tag, "B-PER");
    }

    #[test]
    fn test_blank_runs() {
        let content = "\n\n\nJohn 0 4 O\n\n\n";
        let examples = parse_bio(content, true).unwrap();
        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn test_hash_tokens_are_kept() {
        let examples = parse_bio("Room 0 4 O\n# 5 6 O\n5 7 8 O\n", true).unwrap();
        let texts: Vec<&str> = examples[0].tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Room", "#", "5"]);

        let examples = parse_bio("Room\n#1\nbed\n", false).unwrap();
        let spans: Vec<(&str, usize, usize)> = examples[0]
            .tokens
            .iter()
            .map(|t| (t.text.as_str(), t.start, t.end))
            .collect();
        assert_eq!(spans, vec![("Room", 0, 4), ("#1", 5, 7), ("bed", 8, 11)]);
    }

    #[test]
    fn test_bad_offset_reports_line() {
        let content = "John 0 4 O\nlives five 10 O\n";
        match parse_bio(content, true) {
            Err(NerError::MalformedInput { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed input, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_offsets_is_malformed() {
        assert!(matches!(
            parse_bio("John\n", true),
            Err(NerError::MalformedInput { line: 1, .. })
        ));
    }

    #[test]
    fn test_reversed_offsets_is_malformed() {
        assert!(parse_bio("John 4 0 O\n", true).is_err());
    }

    #[test]
    fn test_empty_content() {
        assert!(parse_bio("", true).unwrap().is_empty());
    }
}
