//! Locates and loads a fine-tuned token classifier from its model directory.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::{bert, distilbert};
use serde::Deserialize;

use crate::config::ModelType;
use crate::error::{NerError, Result};
use crate::model::{BertTokenClassifier, DistilBertTokenClassifier, TokenClassifier};

pub const CONFIG_FILE: &str = "config.json";
pub const SAFETENSORS_FILE: &str = "model.safetensors";
pub const PYTORCH_FILE: &str = "pytorch_model.bin";

/// Dimensions of the classification head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadConfig {
    pub hidden_size: usize,
    pub num_labels: usize,
    pub use_crf: bool,
}

/// The fields of `config.json` the head needs, whatever the architecture.
#[derive(Debug, Deserialize)]
struct RawHeadConfig {
    hidden_size: Option<usize>,
    dim: Option<usize>,
    #[serde(default)]
    use_crf: bool,
}

impl HeadConfig {
    fn from_json(json: &str, num_labels: usize) -> Result<Self> {
        let raw: RawHeadConfig = serde_json::from_str(json)?;
        let hidden_size = raw.hidden_size.or(raw.dim).ok_or_else(|| {
            NerError::ModelLoad(format!("{CONFIG_FILE} has neither hidden_size nor dim"))
        })?;
        Ok(Self {
            hidden_size,
            num_labels,
            use_crf: raw.use_crf,
        })
    }
}

/// Weight file of a model directory, safetensors preferred.
pub fn find_weights(model_dir: &Path) -> Result<PathBuf> {
    [SAFETENSORS_FILE, PYTORCH_FILE]
        .iter()
        .map(|name| model_dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            NerError::ModelLoad(format!(
                "no {SAFETENSORS_FILE} or {PYTORCH_FILE} in {}",
                model_dir.display()
            ))
        })
}

/// Load the token classifier stored in `model_dir` onto `device`.
///
/// # Errors
///
/// Returns `NerError::Configuration` for architectures without a backend
/// and `NerError::ModelLoad` when the config or weights are missing or
/// do not match.
pub fn load_token_classifier(
    model_dir: &Path,
    model_type: ModelType,
    num_labels: usize,
    device: &Device,
) -> Result<Box<dyn TokenClassifier>> {
    if !matches!(model_type, ModelType::Bert | ModelType::Distilbert) {
        return Err(NerError::Configuration(format!(
            "model type {model_type} is recognised but has no inference backend; use bert or distilbert"
        )));
    }

    let config_path = model_dir.join(CONFIG_FILE);
    let config_json = fs::read_to_string(&config_path)
        .map_err(|e| NerError::ModelLoad(format!("{}: {e}", config_path.display())))?;
    let head = HeadConfig::from_json(&config_json, num_labels)?;
    let weights = find_weights(model_dir)?;

    let vb = open_weights(&weights, device)?;
    tracing::info!(
        model = %model_type,
        weights = %weights.display(),
        num_labels,
        use_crf = head.use_crf,
        "loading token classifier"
    );

    let load_err = |e: NerError| NerError::ModelLoad(format!("{}: {e}", weights.display()));
    let model: Box<dyn TokenClassifier> = match model_type {
        ModelType::Distilbert => {
            let config: distilbert::Config = serde_json::from_str(&config_json)
                .map_err(|e| NerError::ModelLoad(format!("{CONFIG_FILE}: {e}")))?;
            Box::new(DistilBertTokenClassifier::load(vb, &config, &head).map_err(load_err)?)
        }
        _ => {
            let config: bert::Config = serde_json::from_str(&config_json)
                .map_err(|e| NerError::ModelLoad(format!("{CONFIG_FILE}: {e}")))?;
            Box::new(BertTokenClassifier::load(vb, &config, &head).map_err(load_err)?)
        }
    };

    Ok(model)
}

fn open_weights(weights: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let is_safetensors = weights
        .extension()
        .is_some_and(|ext| ext == "safetensors");
    let vb = if is_safetensors {
        // SAFETY: the weight file is memory mapped read-only and not modified while loaded.
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device) }
    } else {
        VarBuilder::from_pth(weights, DType::F32, device)
    };
    vb.map_err(|e| NerError::ModelLoad(format!("{}: {e}", weights.display())))
}
