//! # Batched Inference
//!
//! Runs features through a [`TokenClassifier`] in fixed-size batches and
//! decodes one label index per active position.

use candle_core::{DType, Device};

use crate::crf::{argmax_rows, ViterbiDecoder};
use crate::error::{NerError, Result};
use crate::features::Feature;
use crate::labels::LabelVocabulary;
use crate::model::{EncodedBatch, TokenClassifier};

/// Decoded label indices of one feature, special positions included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// One index per active position of the feature
    pub label_ids: Vec<usize>,
}

/// Evaluation loop over a device.
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    batch_size: usize,
    device: Device,
    bio_constraints: bool,
}

impl InferenceRunner {
    pub fn new(batch_size: usize, device: Device) -> Self {
        Self {
            batch_size: batch_size.max(1),
            device,
            bio_constraints: false,
        }
    }

    /// Also forbid BIO-invalid transitions when Viterbi-decoding CRF models.
    /// Off by default: the learned transitions alone decide the path.
    pub fn with_bio_constraints(mut self, enabled: bool) -> Self {
        self.bio_constraints = enabled;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Predict every feature, returning predictions in feature order.
    ///
    /// Each batch is cut to the longest active length it contains. With CRF
    /// transitions the path is Viterbi-decoded over the learned transition
    /// scores, otherwise each position takes its arg-max label.
    ///
    /// # Errors
    ///
    /// Returns `NerError::Inference` when the model's label dimension does
    /// not match the vocabulary, and any forward-pass error.
    pub fn predict(
        &self,
        model: &dyn TokenClassifier,
        features: &[Feature],
        vocab: &LabelVocabulary,
    ) -> Result<Vec<Prediction>> {
        if model.num_labels() != vocab.len() {
            return Err(NerError::Inference(format!(
                "model predicts {} labels but the vocabulary has {}",
                model.num_labels(),
                vocab.len()
            )));
        }

        let decoder = model.crf_transitions().map(|transitions| {
            let viterbi = if self.bio_constraints {
                ViterbiDecoder::for_vocabulary(vocab)
            } else {
                ViterbiDecoder::new(vocab.len())
            };
            (viterbi, transitions)
        });
        let mut predictions = Vec::with_capacity(features.len());

        for chunk in features.chunks(self.batch_size) {
            let refs: Vec<&Feature> = chunk.iter().collect();
            let seq_len = chunk.iter().map(Feature::active_len).max().unwrap_or(0);
            if seq_len == 0 {
                predictions.extend(chunk.iter().map(|_| Prediction { label_ids: Vec::new() }));
                continue;
            }

            let batch = EncodedBatch::from_features(&refs, seq_len, &self.device)?;
            let logits = model.forward(&batch)?;

            let dims = logits.dims();
            if dims != [chunk.len(), seq_len, vocab.len()] {
                return Err(NerError::Inference(format!(
                    "expected logits of shape [{}, {seq_len}, {}], got {dims:?}",
                    chunk.len(),
                    vocab.len()
                )));
            }

            let scores = logits.to_dtype(DType::F32)?.to_vec3::<f32>()?;
            for (feature, rows) in chunk.iter().zip(scores) {
                let active = &rows[..feature.active_len()];
                let label_ids = match &decoder {
                    Some((viterbi, transitions)) => viterbi.decode(active, transitions)?,
                    None => argmax_rows(active),
                };
                predictions.push(Prediction { label_ids });
            }

            tracing::trace!(batch = chunk.len(), seq_len, "batch decoded");
        }

        Ok(predictions)
    }
}

/// Pick the inference device from the configured accelerator ordinals.
///
/// The first ordinal is used, `0` when none is given; CUDA falls back to the
/// CPU when it is not available. Further ordinals are reported as unused.
pub fn select_device(gpu_nodes: &[usize]) -> Result<Device> {
    let ordinal = gpu_nodes.first().copied().unwrap_or(0);
    if gpu_nodes.len() > 1 {
        tracing::warn!(
            used = ordinal,
            unused = ?&gpu_nodes[1..],
            "inference runs on a single device, extra gpu nodes are ignored"
        );
    }

    let device = Device::cuda_if_available(ordinal)?;
    if device.is_cpu() {
        tracing::info!("CUDA not available, running on CPU");
    } else {
        tracing::info!(ordinal, "running on CUDA device");
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;

    /// Scores each position by its token id: label `id % num_labels` wins.
    struct ModuloClassifier {
        num_labels: usize,
        transitions: Option<Vec<Vec<f32>>>,
    }

    impl TokenClassifier for ModuloClassifier {
        fn num_labels(&self) -> usize {
            self.num_labels
        }

        fn forward(&self, batch: &EncodedBatch) -> Result<Tensor> {
            let ids = batch.input_ids.to_vec2::<u32>()?;
            let mut flat = Vec::new();
            for row in &ids {
                for &id in row {
                    let winner = id as usize % self.num_labels;
                    flat.extend((0..self.num_labels).map(|l| if l == winner { 1.0f32 } else { 0.0 }));
                }
            }
            Ok(Tensor::from_vec(
                flat,
                (batch.batch_size(), batch.seq_len(), self.num_labels),
                batch.input_ids.device(),
            )?)
        }

        fn crf_transitions(&self) -> Option<&[Vec<f32>]> {
            self.transitions.as_deref()
        }
    }

    fn vocab() -> LabelVocabulary {
        LabelVocabulary::from_labels(&["O", "B-PER", "I-PER"]).unwrap()
    }

    fn feature(ids: &[u32], seq: usize) -> Feature {
        let active = ids.len();
        let mut input_ids = ids.to_vec();
        input_ids.resize(seq, 0);
        Feature {
            example_index: 0,
            input_ids,
            attention_mask: (0..seq).map(|i| u32::from(i < active)).collect(),
            token_type_ids: vec![0; seq],
            label_ids: vec![0; seq],
            word_index: vec![None; seq],
        }
    }

    #[test]
    fn test_argmax_prediction_per_active_position() {
        let model = ModuloClassifier {
            num_labels: 3,
            transitions: None,
        };
        let features = vec![feature(&[3, 4, 5, 6], 8), feature(&[3, 7, 6], 8), feature(&[3, 6], 8)];
        let runner = InferenceRunner::new(2, Device::Cpu);

        let predictions = runner.predict(&model, &features, &vocab()).unwrap();
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].label_ids, vec![0, 1, 2, 0]);
        assert_eq!(predictions[1].label_ids, vec![0, 1, 0]);
        assert_eq!(predictions[2].label_ids, vec![0, 0]);
    }

    #[test]
    fn test_crf_decoding_follows_learned_transitions() {
        let model = ModuloClassifier {
            num_labels: 3,
            transitions: Some(vec![vec![0.0; 3]; 3]),
        };
        // Position 1 prefers I-PER right after O.
        let features = vec![feature(&[3, 5], 4)];

        let learned = InferenceRunner::new(8, Device::Cpu);
        let predictions = learned.predict(&model, &features, &vocab()).unwrap();
        assert_eq!(predictions[0].label_ids, vec![0, 2]);

        let constrained = InferenceRunner::new(8, Device::Cpu).with_bio_constraints(true);
        let predictions = constrained.predict(&model, &features, &vocab()).unwrap();
        assert_ne!(predictions[0].label_ids[1], 2);
    }

    #[test]
    fn test_crf_decoding_with_sub_token_label() {
        let model = ModuloClassifier {
            num_labels: 4,
            transitions: Some(vec![vec![0.0; 4]; 4]),
        };
        let vocab = LabelVocabulary::from_labels(&["O", "B-PER", "I-PER", "X"]).unwrap();
        let features = vec![feature(&[5, 7, 6], 4)];

        for runner in [
            InferenceRunner::new(8, Device::Cpu),
            InferenceRunner::new(8, Device::Cpu).with_bio_constraints(true),
        ] {
            let predictions = runner.predict(&model, &features, &vocab).unwrap();
            assert_eq!(predictions[0].label_ids, vec![1, 3, 2]);
        }
    }

    #[test]
    fn test_label_dimension_mismatch() {
        let model = ModuloClassifier {
            num_labels: 4,
            transitions: None,
        };
        let runner = InferenceRunner::new(8, Device::Cpu);
        let result = runner.predict(&model, &[feature(&[1, 2], 4)], &vocab());
        assert!(matches!(result, Err(NerError::Inference(_))));
    }

    #[test]
    fn test_no_features() {
        let model = ModuloClassifier {
            num_labels: 3,
            transitions: None,
        };
        let runner = InferenceRunner::new(8, Device::Cpu);
        assert!(runner.predict(&model, &[], &vocab()).unwrap().is_empty());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_select_device_without_cuda_is_cpu() {
        assert!(select_device(&[]).unwrap().is_cpu());
        assert!(select_device(&[1, 2]).unwrap().is_cpu());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        assert_eq!(InferenceRunner::new(0, Device::Cpu).batch_size(), 1);
    }
}
