use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};

use crate::error::Result;
use crate::model::{load_transitions, EncodedBatch, HeadConfig, TokenClassifier};

/// BERT encoder with a token classification head (`bert.*` + `classifier.*`).
pub struct BertTokenClassifier {
    bert: BertModel,
    classifier: Linear,
    num_labels: usize,
    transitions: Option<Vec<Vec<f32>>>,
}

impl BertTokenClassifier {
    /// Load the encoder, the linear head and, with `head.use_crf`, the
    /// transition matrix from `vb`.
    pub fn load(vb: VarBuilder, config: &Config, head: &HeadConfig) -> Result<Self> {
        let classifier = candle_nn::linear(head.hidden_size, head.num_labels, vb.pp("classifier"))?;
        let transitions = if head.use_crf {
            Some(load_transitions(&vb, head.num_labels)?)
        } else {
            None
        };
        let bert = BertModel::load(vb.pp("bert"), config)?;

        Ok(Self {
            bert,
            classifier,
            num_labels: head.num_labels,
            transitions,
        })
    }
}

impl TokenClassifier for BertTokenClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn forward(&self, batch: &EncodedBatch) -> Result<Tensor> {
        let hidden_states = self.bert.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?;
        Ok(self.classifier.forward(&hidden_states)?)
    }

    fn crf_transitions(&self) -> Option<&[Vec<f32>]> {
        self.transitions.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    use crate::features::Feature;

    const TINY_BERT: &str = r#"{
        "vocab_size": 32,
        "hidden_size": 8,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": 16,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "use_cache": false,
        "classifier_dropout": null,
        "model_type": "bert"
    }"#;

    fn feature(ids: &[u32]) -> Feature {
        let n = ids.len();
        Feature {
            example_index: 0,
            input_ids: ids.to_vec(),
            attention_mask: vec![1; n],
            token_type_ids: vec![0; n],
            label_ids: vec![0; n],
            word_index: vec![None; n],
        }
    }

    #[test]
    fn test_forward_shape_with_zero_weights() {
        let device = Device::Cpu;
        let config: Config = serde_json::from_str(TINY_BERT).unwrap();
        let head = HeadConfig {
            hidden_size: 8,
            num_labels: 5,
            use_crf: true,
        };
        let vb = VarBuilder::zeros(DType::F32, &device);
        let model = BertTokenClassifier::load(vb, &config, &head).unwrap();

        let a = feature(&[2, 5, 6, 3]);
        let b = feature(&[2, 7, 3, 0]);
        let batch = EncodedBatch::from_features(&[&a, &b], 4, &device).unwrap();
        let logits = model.forward(&batch).unwrap();

        assert_eq!(logits.dims(), &[2, 4, 5]);
        assert_eq!(model.num_labels(), 5);
        let transitions = model.crf_transitions().unwrap();
        assert_eq!(transitions.len(), 5);
        assert!(transitions.iter().flatten().all(|&s| s == 0.0));
    }
}
