//! # Raw Text Splitter
//!
//! Splits plain documents into sentences of word tokens with character
//! offsets into the original text. Used when input files are raw text
//! rather than pre-tokenized BIO.

use regex::Regex;

use crate::data::{TestExample, Token};
use crate::error::Result;
use crate::labels::OUTSIDE_LABEL;

/// Punctuation that closes a sentence when followed by whitespace or end of line.
const SENTENCE_TERMINATORS: &[&str] = &[".", "!", "?"];

/// Sentence and word splitter for raw documents.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    re_word: Regex,
}

impl TextSplitter {
    /// Create a new splitter.
    ///
    /// # Errors
    ///
    /// Returns `NerError::Regex` if the word pattern fails to compile
    /// (should never happen with the static pattern defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_word: Regex::new(r"\w+(?:['’\-]\w+)*|[^\w\s]")?,
        })
    }

    /// Split `text` into sentences.
    ///
    /// Every line break ends a sentence; `.`, `!` and `?` end one when the
    /// next character is whitespace or the line ends. Offsets are character
    /// (not byte) offsets and every tag is the placeholder `O`.
    ///
    /// # Examples
    /// ```
    /// use nerbatch_core::data::TextSplitter;
    ///
    /// let splitter = TextSplitter::new().unwrap();
    /// let sentences = splitter.split("John lives in Paris. He works.");
    /// assert_eq!(sentences.len(), 2);
    /// assert_eq!(sentences[0].tokens[3].text, "Paris");
    /// assert_eq!(sentences[0].tokens[3].start, 14);
    /// ```
    pub fn split(&self, text: &str) -> Vec<TestExample> {
        let mut examples = Vec::new();
        let mut offsets = CharOffsets::new(text);
        let mut line_start = 0;

        for line in text.split_inclusive('\n') {
            let mut current = Vec::new();

            for m in self.re_word.find_iter(line) {
                let start = offsets.char_index(line_start + m.start());
                let end = offsets.char_index(line_start + m.end());
                current.push(Token::new(m.as_str(), start, end, OUTSIDE_LABEL));

                let closes = SENTENCE_TERMINATORS.contains(&m.as_str())
                    && line[m.end()..]
                        .chars()
                        .next()
                        .is_none_or(char::is_whitespace);
                if closes {
                    examples.push(TestExample::new(std::mem::take(&mut current)));
                }
            }

            if !current.is_empty() {
                examples.push(TestExample::new(current));
            }
            line_start += line.len();
        }

        examples
    }
}

/// Incremental byte → char offset conversion for monotonically increasing queries.
struct CharOffsets<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn char_index(&mut self, byte: usize) -> usize {
        if byte >= self.byte {
            self.chars += self.text[self.byte..byte].chars().count();
        } else {
            self.chars = self.text[..byte].chars().count();
        }
        self.byte = byte;
        self.chars
    }
}
