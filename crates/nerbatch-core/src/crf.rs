//! # Viterbi Decoding for CRF
//!
//! Finds the most likely label sequence given per-position emission scores,
//! learned transition scores and, optionally, the BIO transition constraints
//! of the label vocabulary.

use crate::error::{NerError, Result};
use crate::labels::LabelVocabulary;

/// Viterbi decoder over a fixed label set.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    /// `allowed[from][to]`
    allowed: Vec<Vec<bool>>,
}

impl ViterbiDecoder {
    /// Create an unconstrained decoder for `num_tags` labels.
    pub fn new(num_tags: usize) -> Self {
        Self {
            num_tags,
            allowed: vec![vec![true; num_tags]; num_tags],
        }
    }

    /// Create a decoder that forbids transitions the BIO scheme rules out.
    ///
    /// Transitions out of non-BIO labels (`X`, `[CLS]`, ...) stay allowed.
    pub fn for_vocabulary(vocab: &LabelVocabulary) -> Self {
        Self {
            num_tags: vocab.len(),
            allowed: vocab.transition_mask(),
        }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode the best label sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` scores
    /// * `transition_matrix` - `[num_tags][num_tags]` scores indexed `[from][to]`
    ///
    /// # Errors
    ///
    /// Returns `NerError::Inference` when a dimension does not match `num_tags`.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(NerError::Inference(format!(
                "emission score dimension mismatch: expected {}, got {}",
                self.num_tags,
                row.len()
            )));
        }
        if transition_matrix.len() != self.num_tags
            || transition_matrix.iter().any(|row| row.len() != self.num_tags)
        {
            return Err(NerError::Inference(format!(
                "transition matrix must be {n}x{n}",
                n = self.num_tags
            )));
        }

        let mut dp = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr: Vec<Vec<Option<usize>>> = vec![vec![None; self.num_tags]; seq_len];

        dp[0].copy_from_slice(&emission_scores[0]);

        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = None;

                for prev_tag in 0..self.num_tags {
                    if !self.allowed[prev_tag][curr_tag] {
                        continue;
                    }

                    let score = dp[pos - 1][prev_tag]
                        + transition_matrix[prev_tag][curr_tag]
                        + emission_scores[pos][curr_tag];

                    if score > best_score {
                        best_score = score;
                        best_prev = Some(prev_tag);
                    }
                }

                dp[pos][curr_tag] = best_score;
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Backtrack
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            if dp[seq_len - 1][tag] > best_final_score {
                best_final_score = dp[seq_len - 1][tag];
                best_final_tag = tag;
            }
        }

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag].unwrap_or(0);
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }
}

/// Index of the highest score in each row.
pub fn argmax_rows(scores: &[Vec<f32>]) -> Vec<usize> {
    scores
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (idx, &score)| {
                    if score > best.1 { (idx, score) } else { best }
                })
                .0
        })
        .collect()
}
