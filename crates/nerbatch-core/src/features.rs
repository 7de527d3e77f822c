//! # Feature Converter
//!
//! Turns sentences of words into fixed-length model inputs. Words are split
//! into sub-words; only the first sub-word of each word carries an alignment
//! marker, which is what lets predictions be folded back onto words.

use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;

use crate::config::ModelType;
use crate::data::TestExample;
use crate::error::{NerError, Result};
use crate::labels::LabelVocabulary;

/// Ids of the special tokens framing every sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokenIds {
    pub cls: u32,
    pub sep: u32,
    pub pad: u32,
    pub unk: u32,
}

/// Splits single words into sub-word ids.
pub trait WordTokenizer {
    /// Sub-word ids of one word, without special tokens.
    fn tokenize_word(&self, word: &str) -> Result<Vec<u32>>;

    /// Ids of the framing special tokens.
    fn special_ids(&self) -> SpecialTokenIds;
}

/// [`WordTokenizer`] backed by a Hugging Face `tokenizer.json`.
pub struct HfWordTokenizer {
    inner: HfTokenizer,
    special: SpecialTokenIds,
    lower_case: bool,
}

impl HfWordTokenizer {
    /// Wrap a loaded tokenizer, resolving the special tokens of `model_type`.
    ///
    /// Padding and truncation saved in `tokenizer.json` are cleared: words are
    /// encoded one at a time and framed by [`convert_examples_to_features`].
    ///
    /// # Errors
    ///
    /// Returns `NerError::ModelLoad` if a special token is missing from the vocabulary.
    pub fn new(mut inner: HfTokenizer, model_type: ModelType, lower_case: bool) -> Result<Self> {
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(|e| NerError::ModelLoad(format!("failed to disable truncation: {e}")))?;

        let names = model_type.special_tokens();
        let resolve = |token: &str| {
            inner.token_to_id(token).ok_or_else(|| {
                NerError::ModelLoad(format!(
                    "tokenizer vocabulary has no {token} token required by {model_type}"
                ))
            })
        };

        let special = SpecialTokenIds {
            cls: resolve(names.cls)?,
            sep: resolve(names.sep)?,
            pad: resolve(names.pad)?,
            unk: resolve(names.unk)?,
        };

        Ok(Self {
            inner,
            special,
            lower_case,
        })
    }

    /// Load `tokenizer.json` from disk.
    pub fn from_file(path: &Path, model_type: ModelType, lower_case: bool) -> Result<Self> {
        let inner = HfTokenizer::from_file(path).map_err(|e| {
            NerError::ModelLoad(format!("failed to load tokenizer {}: {e}", path.display()))
        })?;
        Self::new(inner, model_type, lower_case)
    }
}

impl WordTokenizer for HfWordTokenizer {
    fn tokenize_word(&self, word: &str) -> Result<Vec<u32>> {
        let lowered;
        let text = if self.lower_case {
            lowered = word.to_lowercase();
            lowered.as_str()
        } else {
            word
        };

        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| NerError::Tokenizer(format!("failed to encode {word:?}: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn special_ids(&self) -> SpecialTokenIds {
        self.special
    }
}

/// Fixed-length encoding of a sentence, or of one window of a long sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    /// Index of the source sentence in the converted example list
    pub example_index: usize,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    /// Gold or placeholder label ids; unused by decoding
    pub label_ids: Vec<u32>,
    /// `Some(word)` on the first sub-word of each word of the sentence
    pub word_index: Vec<Option<usize>>,
}

impl Feature {
    /// Number of unpadded positions, special tokens included.
    pub fn active_len(&self) -> usize {
        self.attention_mask.iter().take_while(|&&m| m == 1).count()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }
}

/// A word ready to be placed in a feature window.
struct WordPieces {
    word: usize,
    label: u32,
    pieces: Vec<u32>,
}

/// Convert sentences into fixed-length features of exactly `max_seq_len` positions.
///
/// A sentence whose sub-words exceed `max_seq_len - 2` is split at word
/// boundaries into consecutive windows, so every word is still predicted.
/// A single word longer than the budget keeps its leading sub-words.
///
/// # Errors
///
/// Returns `NerError::FeatureConversion` if `max_seq_len < 3`, and any
/// tokenizer error unchanged.
pub fn convert_examples_to_features(
    examples: &[TestExample],
    tokenizer: &dyn WordTokenizer,
    vocab: &LabelVocabulary,
    max_seq_len: usize,
) -> Result<Vec<Feature>> {
    if max_seq_len < 3 {
        return Err(NerError::FeatureConversion(format!(
            "max sequence length {max_seq_len} leaves no room for tokens"
        )));
    }

    let budget = max_seq_len - 2;
    let special = tokenizer.special_ids();
    let outside = vocab.outside_index() as u32;
    let mut features = Vec::new();

    for (example_index, example) in examples.iter().enumerate() {
        let mut window: Vec<WordPieces> = Vec::new();
        let mut window_len = 0;

        for (word, token) in example.tokens.iter().enumerate() {
            let mut pieces = tokenizer.tokenize_word(&token.text)?;
            if pieces.is_empty() {
                pieces.push(special.unk);
            }
            if pieces.len() > budget {
                tracing::warn!(
                    word = %token.text,
                    pieces = pieces.len(),
                    budget,
                    "word exceeds the sequence budget, keeping its leading sub-words"
                );
                pieces.truncate(budget);
            }

            if window_len + pieces.len() > budget && !window.is_empty() {
                features.push(build_feature(example_index, &window, special, outside, max_seq_len));
                window.clear();
                window_len = 0;
            }

            let label = vocab
                .index(&token.tag)
                .map_or(outside, |idx| idx as u32);
            window_len += pieces.len();
            window.push(WordPieces {
                word,
                label,
                pieces,
            });
        }

        if !window.is_empty() {
            features.push(build_feature(example_index, &window, special, outside, max_seq_len));
        }
    }

    Ok(features)
}

fn build_feature(
    example_index: usize,
    window: &[WordPieces],
    special: SpecialTokenIds,
    outside: u32,
    max_seq_len: usize,
) -> Feature {
    let mut input_ids = Vec::with_capacity(max_seq_len);
    let mut label_ids = Vec::with_capacity(max_seq_len);
    let mut word_index = Vec::with_capacity(max_seq_len);

    input_ids.push(special.cls);
    label_ids.push(outside);
    word_index.push(None);

    for entry in window {
        for (i, &piece) in entry.pieces.iter().enumerate() {
            input_ids.push(piece);
            if i == 0 {
                label_ids.push(entry.label);
                word_index.push(Some(entry.word));
            } else {
                label_ids.push(outside);
                word_index.push(None);
            }
        }
    }

    input_ids.push(special.sep);
    label_ids.push(outside);
    word_index.push(None);

    let active = input_ids.len();
    let mut attention_mask = vec![1; active];

    // Pad to the fixed length
    input_ids.resize(max_seq_len, special.pad);
    label_ids.resize(max_seq_len, outside);
    word_index.resize(max_seq_len, None);
    attention_mask.resize(max_seq_len, 0);

    Feature {
        example_index,
        input_ids,
        attention_mask,
        token_type_ids: vec![0; max_seq_len],
        label_ids,
        word_index,
    }
}
