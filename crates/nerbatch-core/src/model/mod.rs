//! # Token Classification Models
//!
//! Transformer encoders with a per-token linear head, and optionally learned
//! CRF transition scores, loaded through candle.

pub mod bert;
pub mod distilbert;
pub mod loader;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;

use crate::error::{NerError, Result};
use crate::features::Feature;

pub use bert::BertTokenClassifier;
pub use distilbert::DistilBertTokenClassifier;
pub use loader::{load_token_classifier, HeadConfig};

/// A batch of features as `[batch, seq_len]` tensors on the inference device.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

impl EncodedBatch {
    /// Stack `features`, keeping only their first `seq_len` positions.
    ///
    /// # Errors
    ///
    /// Returns `NerError::Inference` for an empty batch or a `seq_len`
    /// longer than a feature.
    pub fn from_features(features: &[&Feature], seq_len: usize, device: &Device) -> Result<Self> {
        if features.is_empty() {
            return Err(NerError::Inference("cannot encode an empty batch".into()));
        }
        if let Some(short) = features.iter().find(|f| f.seq_len() < seq_len) {
            return Err(NerError::Inference(format!(
                "feature of length {} cannot fill {seq_len} positions",
                short.seq_len()
            )));
        }

        let shape = (features.len(), seq_len);
        let input_ids = stack(features, seq_len, |f| f.input_ids.as_slice());
        let attention_mask = stack(features, seq_len, |f| f.attention_mask.as_slice());
        let token_type_ids = stack(features, seq_len, |f| f.token_type_ids.as_slice());

        Ok(Self {
            input_ids: Tensor::from_vec(input_ids, shape, device)?,
            attention_mask: Tensor::from_vec(attention_mask, shape, device)?,
            token_type_ids: Tensor::from_vec(token_type_ids, shape, device)?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.input_ids.dims().first().copied().unwrap_or(0)
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.dims().get(1).copied().unwrap_or(0)
    }
}

fn stack(features: &[&Feature], seq_len: usize, column: impl Fn(&Feature) -> &[u32]) -> Vec<u32> {
    features
        .iter()
        .flat_map(|f| column(f)[..seq_len].iter().copied())
        .collect()
}

/// A model producing per-position label scores.
pub trait TokenClassifier {
    /// Size of the label dimension of [`TokenClassifier::forward`].
    fn num_labels(&self) -> usize;

    /// Emission scores of shape `[batch, seq_len, num_labels]`.
    fn forward(&self, batch: &EncodedBatch) -> Result<Tensor>;

    /// Learned `[from][to]` transition scores when the model carries a CRF layer.
    fn crf_transitions(&self) -> Option<&[Vec<f32>]> {
        None
    }
}

/// Read the `crf.transitions` matrix stored next to the encoder weights.
pub(crate) fn load_transitions(vb: &VarBuilder, num_labels: usize) -> Result<Vec<Vec<f32>>> {
    let transitions = vb
        .pp("crf")
        .get((num_labels, num_labels), "transitions")
        .map_err(|e| NerError::ModelLoad(format!("CRF transitions: {e}")))?;
    Ok(transitions.to_vec2::<f32>()?)
}
