//! # Label Vocabulary
//!
//! The bidirectional label ⇄ index mapping persisted next to a fine-tuned
//! model as `label2idx.json`, plus BIO helpers over label strings.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{NerError, Result};

/// File name of the persisted label mapping inside a pretrained model directory.
pub const LABEL_FILE: &str = "label2idx.json";

/// The outside label, also used as the placeholder tag for unlabeled input.
pub const OUTSIDE_LABEL: &str = "O";

/// A label string viewed through the BIO tagging scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioTag<'a> {
    /// `B-<type>`: first token of an entity.
    Begin(&'a str),
    /// `I-<type>`: continuation of an entity.
    Inside(&'a str),
    /// `O`: token outside any entity.
    Outside,
    /// Anything else (special labels such as `X` or `[CLS]`).
    Other(&'a str),
}

impl<'a> BioTag<'a> {
    /// Parse a label string.
    pub fn parse(label: &'a str) -> Self {
        if label == OUTSIDE_LABEL {
            return BioTag::Outside;
        }
        match label.split_once('-') {
            Some(("B", entity)) if !entity.is_empty() => BioTag::Begin(entity),
            Some(("I", entity)) if !entity.is_empty() => BioTag::Inside(entity),
            _ => BioTag::Other(label),
        }
    }

    /// Entity type carried by a `B-`/`I-` tag.
    pub fn entity_type(&self) -> Option<&'a str> {
        match *self {
            BioTag::Begin(entity) | BioTag::Inside(entity) => Some(entity),
            BioTag::Outside | BioTag::Other(_) => None,
        }
    }

    /// Check if transitioning from `from` tag to `to` tag is valid.
    ///
    /// `I-X` may only follow `B-X`, `I-X` or a non-BIO label such as the
    /// sub-token label `X`; every other transition is allowed.
    pub fn is_valid_transition(from: BioTag<'_>, to: BioTag<'_>) -> bool {
        match (from, to) {
            (BioTag::Other(_), _) => true,
            (_, BioTag::Inside(entity)) => from.entity_type() == Some(entity),
            _ => true,
        }
    }
}

impl fmt::Display for BioTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioTag::Begin(entity) => write!(f, "B-{entity}"),
            BioTag::Inside(entity) => write!(f, "I-{entity}"),
            BioTag::Outside => write!(f, "{OUTSIDE_LABEL}"),
            BioTag::Other(label) => write!(f, "{label}"),
        }
    }
}

/// Bidirectional label ⇄ index mapping, fixed for a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    label2idx: HashMap<String, usize>,
    idx2label: Vec<String>,
}

impl LabelVocabulary {
    /// Build a vocabulary from a label → index map.
    ///
    /// # Errors
    ///
    /// Returns `NerError::Configuration` if the map is empty or its indices
    /// are not exactly `0..len`.
    pub fn from_map(label2idx: HashMap<String, usize>) -> Result<Self> {
        if label2idx.is_empty() {
            return Err(NerError::Configuration("label vocabulary is empty".into()));
        }

        let mut slots: Vec<Option<String>> = vec![None; label2idx.len()];
        for (label, &idx) in &label2idx {
            let slot = slots.get_mut(idx).ok_or_else(|| {
                NerError::Configuration(format!(
                    "label {label:?} has index {idx}, outside 0..{}",
                    label2idx.len()
                ))
            })?;
            if let Some(existing) = slot.replace(label.clone()) {
                return Err(NerError::Configuration(format!(
                    "labels {existing:?} and {label:?} share index {idx}"
                )));
            }
        }

        // every slot is filled: indices are distinct and all below len
        let idx2label = slots.into_iter().flatten().collect();

        Ok(Self {
            label2idx,
            idx2label,
        })
    }

    /// Build a vocabulary from labels in index order.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let map = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.as_ref().to_string(), idx))
            .collect();
        Self::from_map(map)
    }

    /// Load `label2idx.json` from a pretrained model directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(LABEL_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            NerError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let label2idx: HashMap<String, usize> = serde_json::from_str(&content).map_err(|e| {
            NerError::Configuration(format!("malformed {}: {e}", path.display()))
        })?;
        let vocab = Self::from_map(label2idx)?;
        tracing::debug!(labels = vocab.len(), path = %path.display(), "loaded label vocabulary");
        Ok(vocab)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.idx2label.len()
    }

    /// Always `false` for a constructed vocabulary.
    pub fn is_empty(&self) -> bool {
        self.idx2label.is_empty()
    }

    /// Label string for an index.
    ///
    /// # Errors
    ///
    /// Returns `NerError::UnknownLabelIndex` for indices outside the vocabulary.
    pub fn label(&self, idx: usize) -> Result<&str> {
        self.idx2label
            .get(idx)
            .map(String::as_str)
            .ok_or(NerError::UnknownLabelIndex(idx))
    }

    /// Index for a label string.
    pub fn index(&self, label: &str) -> Option<usize> {
        self.label2idx.get(label).copied()
    }

    /// Index used for placeholder and non-leading sub-word positions:
    /// the outside label when present, index 0 otherwise.
    pub fn outside_index(&self) -> usize {
        self.index(OUTSIDE_LABEL).unwrap_or(0)
    }

    /// Labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.idx2label
    }

    /// `mask[from][to]` is `true` when the BIO scheme allows `from → to`.
    pub fn transition_mask(&self) -> Vec<Vec<bool>> {
        let tags: Vec<BioTag<'_>> = self.idx2label.iter().map(|l| BioTag::parse(l)).collect();
        tags.iter()
            .map(|&from| {
                tags.iter()
                    .map(|&to| BioTag::is_valid_transition(from, to))
                    .collect()
            })
            .collect()
    }
}
