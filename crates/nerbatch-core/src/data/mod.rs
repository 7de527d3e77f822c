//! # Data Processor
//!
//! Reads one input document at a time and turns it into sentences of
//! tokens with character offsets.

pub mod bio;
pub mod text;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NerError, Result};

pub use bio::parse_bio;
pub use text::TextSplitter;

/// File extension of prediction inputs.
pub const INPUT_EXTENSION: &str = "txt";

/// A word with its position in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The word text
    pub text: String,
    /// Start character offset in the source document
    pub start: usize,
    /// End character offset (exclusive)
    pub end: usize,
    /// Gold or placeholder tag
    pub tag: String,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize, tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            tag: tag.into(),
        }
    }
}

/// One sentence awaiting prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestExample {
    pub tokens: Vec<Token>,
}

impl TestExample {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Loads test examples from a directory of input documents.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    data_dir: PathBuf,
    offset_info: bool,
    splitter: TextSplitter,
}

impl DataProcessor {
    /// Create a processor reading from `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            data_dir: data_dir.into(),
            offset_info: false,
            splitter: TextSplitter::new()?,
        })
    }

    /// Declare that pre-tokenized inputs carry `start end` offset columns.
    pub fn offset_info_available(&mut self) {
        self.offset_info = true;
    }

    /// Builder form of [`DataProcessor::offset_info_available`].
    pub fn with_offset_information(mut self, enabled: bool) -> Self {
        self.offset_info = enabled;
        self
    }

    pub fn has_offset_information(&self) -> bool {
        self.offset_info
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// All `*.txt` files of the data directory, sorted by name.
    pub fn list_input_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| NerError::file(&self.data_dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| NerError::file(&self.data_dir, e))?.path();
            let is_input = path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION));
            if is_input {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read `file_name` from the data directory and split it into sentences.
    ///
    /// With `use_bio` the file is pre-tokenized BIO; otherwise it is raw text.
    ///
    /// # Errors
    ///
    /// Returns `NerError::File` if the file cannot be read and
    /// `NerError::MalformedInput` if a BIO line is invalid.
    pub fn get_test_examples(&self, file_name: &str, use_bio: bool) -> Result<Vec<TestExample>> {
        let content = self.read_document(file_name)?;
        self.examples_from_content(&content, use_bio)
    }

    /// Full text of `file_name` in the data directory.
    pub fn read_document(&self, file_name: &str) -> Result<String> {
        let path = self.data_dir.join(file_name);
        fs::read_to_string(&path).map_err(|e| NerError::file(&path, e))
    }

    /// Split already loaded document text, BIO or raw.
    pub fn examples_from_content(&self, content: &str, use_bio: bool) -> Result<Vec<TestExample>> {
        if use_bio {
            parse_bio(content, self.offset_info)
        } else {
            Ok(self.splitter.split(content))
        }
    }
}
