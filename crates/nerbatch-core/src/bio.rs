//! # BIO Writer
//!
//! Realigns sub-word predictions to the original words and renders them as
//! `token<TAB>label` lines.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::data::TestExample;
use crate::error::{NerError, Result};
use crate::features::Feature;
use crate::inference::Prediction;
use crate::labels::LabelVocabulary;

/// A word with its predicted label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledToken {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// One sentence of labeled words, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSentence {
    pub tokens: Vec<LabeledToken>,
}

impl LabeledSentence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Map predictions back onto the words of `examples`.
///
/// Every word takes the label predicted on its first sub-word, so a
/// sentence of N words always yields N labeled tokens.
///
/// # Errors
///
/// Returns `NerError::Inference` when predictions do not line up with the
/// features or a word received no prediction, and
/// `NerError::UnknownLabelIndex` for an index outside the vocabulary.
pub fn output_bio(
    examples: &[TestExample],
    features: &[Feature],
    predictions: &[Prediction],
    vocab: &LabelVocabulary,
) -> Result<Vec<LabeledSentence>> {
    if features.len() != predictions.len() {
        return Err(NerError::Inference(format!(
            "{} predictions for {} features",
            predictions.len(),
            features.len()
        )));
    }

    let mut word_labels: Vec<Vec<Option<usize>>> =
        examples.iter().map(|e| vec![None; e.len()]).collect();

    for (feature, prediction) in features.iter().zip(predictions) {
        let labels = word_labels.get_mut(feature.example_index).ok_or_else(|| {
            NerError::Inference(format!(
                "feature refers to sentence {} of {}",
                feature.example_index,
                examples.len()
            ))
        })?;

        for (&word, &label) in feature.word_index.iter().zip(&prediction.label_ids) {
            let Some(word) = word else { continue };
            if let Some(slot) = labels.get_mut(word) {
                slot.get_or_insert(label);
            }
        }
    }

    examples
        .iter()
        .zip(word_labels)
        .enumerate()
        .map(|(sentence, (example, labels))| -> Result<LabeledSentence> {
            let tokens = example
                .tokens
                .iter()
                .zip(labels)
                .enumerate()
                .map(|(word, (token, label))| -> Result<LabeledToken> {
                    let idx = label.ok_or_else(|| {
                        NerError::Inference(format!(
                            "word {word} of sentence {sentence} received no prediction"
                        ))
                    })?;
                    Ok(LabeledToken {
                        text: token.text.clone(),
                        start: token.start,
                        end: token.end,
                        label: vocab.label(idx)?.to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(LabeledSentence { tokens })
        })
        .collect()
}

/// Render sentences as `text\tlabel` lines with a blank line after each sentence.
pub fn render_bio(sentences: &[LabeledSentence]) -> String {
    let mut out = String::new();
    for sentence in sentences {
        for token in &sentence.tokens {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{}\t{}", token.text, token.label);
        }
        out.push('\n');
    }
    out
}
