use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::distilbert::{Config, DistilBertModel};

use crate::error::Result;
use crate::model::{load_transitions, EncodedBatch, HeadConfig, TokenClassifier};

/// DistilBERT encoder with a token classification head (`distilbert.*` + `classifier.*`).
pub struct DistilBertTokenClassifier {
    distilbert: DistilBertModel,
    emission: Linear,
    num_labels: usize,
    transitions: Option<Vec<Vec<f32>>>,
}

impl DistilBertTokenClassifier {
    pub fn load(vb: VarBuilder, config: &Config, head: &HeadConfig) -> Result<Self> {
        let distilbert = DistilBertModel::load(vb.pp("distilbert"), config)?;
        let emission = candle_nn::linear(head.hidden_size, head.num_labels, vb.pp("classifier"))?;
        let transitions = if head.use_crf {
            Some(load_transitions(&vb, head.num_labels)?)
        } else {
            None
        };

        Ok(Self {
            distilbert,
            emission,
            num_labels: head.num_labels,
            transitions,
        })
    }
}

impl TokenClassifier for DistilBertTokenClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn forward(&self, batch: &EncodedBatch) -> Result<Tensor> {
        // DistilBERT masks positions where the mask is non-zero: [batch, 1, 1, seq_len]
        let padding = batch.attention_mask.eq(0u32)?.unsqueeze(1)?.unsqueeze(1)?;
        let hidden_states = self.distilbert.forward(&batch.input_ids, &padding)?;
        Ok(self.emission.forward(&hidden_states)?)
    }

    fn crf_transitions(&self) -> Option<&[Vec<f32>]> {
        self.transitions.as_deref()
    }
}
