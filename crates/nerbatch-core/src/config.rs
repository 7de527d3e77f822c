//! # Prediction Configuration
//!
//! The immutable run configuration, the model architecture selector, and
//! the output format selector.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};
use crate::labels::LABEL_FILE;

/// Transformer architecture of the pretrained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Bert,
    Roberta,
    Xlnet,
    Albert,
    Distilbert,
}

/// Surface forms of the special tokens an architecture frames sequences with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: &'static str,
    pub sep: &'static str,
    pub pad: &'static str,
    pub unk: &'static str,
}

const WORDPIECE_SPECIALS: SpecialTokens = SpecialTokens {
    cls: "[CLS]",
    sep: "[SEP]",
    pad: "[PAD]",
    unk: "[UNK]",
};

const BPE_SPECIALS: SpecialTokens = SpecialTokens {
    cls: "<s>",
    sep: "</s>",
    pad: "<pad>",
    unk: "<unk>",
};

// ALBERT's sentencepiece vocabulary keeps BERT-style framing tokens.
const ALBERT_SPECIALS: SpecialTokens = SpecialTokens {
    cls: "[CLS]",
    sep: "[SEP]",
    pad: "<pad>",
    unk: "<unk>",
};

const SENTENCEPIECE_SPECIALS: SpecialTokens = SpecialTokens {
    cls: "<cls>",
    sep: "<sep>",
    pad: "<pad>",
    unk: "<unk>",
};

impl ModelType {
    /// All architectures accepted on the command line.
    pub fn all() -> &'static [ModelType] {
        &[
            ModelType::Bert,
            ModelType::Roberta,
            ModelType::Xlnet,
            ModelType::Albert,
            ModelType::Distilbert,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Bert => "bert",
            ModelType::Roberta => "roberta",
            ModelType::Xlnet => "xlnet",
            ModelType::Albert => "albert",
            ModelType::Distilbert => "distilbert",
        }
    }

    /// Special tokens of the architecture's tokenizer family.
    pub fn special_tokens(&self) -> SpecialTokens {
        match self {
            ModelType::Bert | ModelType::Distilbert => WORDPIECE_SPECIALS,
            ModelType::Roberta => BPE_SPECIALS,
            ModelType::Xlnet => SENTENCEPIECE_SPECIALS,
            ModelType::Albert => ALBERT_SPECIALS,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = NerError;

    fn from_str(value: &str) -> Result<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        ModelType::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == lowered)
            .ok_or_else(|| {
                NerError::Configuration(format!(
                    "unknown model type {value:?}; valid values: bert, roberta, xlnet, albert, distilbert"
                ))
            })
    }
}

/// Target of the optional formatting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// No formatting pass; BIO only.
    #[default]
    Bio,
    /// brat standoff (`.ann`).
    Brat,
    /// BioC XML.
    Bioc,
}

impl OutputFormat {
    /// Numeric selector used by `--do_format`.
    pub fn code(&self) -> u8 {
        match self {
            OutputFormat::Bio => 0,
            OutputFormat::Brat => 1,
            OutputFormat::Bioc => 2,
        }
    }

    /// `true` when a formatting pass has to run.
    pub fn requires_conversion(&self) -> bool {
        *self != OutputFormat::Bio
    }
}

impl TryFrom<u8> for OutputFormat {
    type Error = NerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(OutputFormat::Bio),
            1 => Ok(OutputFormat::Brat),
            2 => Ok(OutputFormat::Bioc),
            other => Err(NerError::Configuration(format!(
                "unknown format selector {other}; use 0=bio, 1=brat, 2=bioc"
            ))),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = NerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bio" | "none" => Ok(OutputFormat::Bio),
            "brat" => Ok(OutputFormat::Brat),
            "bioc" => Ok(OutputFormat::Bioc),
            other => {
                let code: u8 = other.parse().map_err(|_| {
                    NerError::Configuration(format!(
                        "unknown format {value:?}; use 0/bio, 1/brat or 2/bioc"
                    ))
                })?;
                OutputFormat::try_from(code)
            }
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Bio => write!(f, "bio"),
            OutputFormat::Brat => write!(f, "brat"),
            OutputFormat::Bioc => write!(f, "bioc"),
        }
    }
}

/// Immutable record of every run parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionConfig {
    pub model_type: ModelType,
    /// Directory holding the model weights, `config.json`, `tokenizer.json` and `label2idx.json`
    pub pretrained_model: PathBuf,
    /// Directory of `*.txt` prediction inputs
    pub preprocessed_text_dir: PathBuf,
    /// Source text handed to the formatting pass
    pub raw_text_dir: PathBuf,
    pub data_has_offset_information: bool,
    /// Where `<stem>.bio.txt` files go
    pub output_dir: PathBuf,
    /// Explicit formatting pass output directory
    pub output_dir_formatted: Option<PathBuf>,
    pub do_lower_case: bool,
    pub eval_batch_size: usize,
    pub max_seq_length: usize,
    pub output_format: OutputFormat,
    pub do_copy: bool,
    pub progress_bar: bool,
    /// Pre-tokenized input written straight to disk; otherwise raw text kept in memory
    pub use_bio: bool,
    /// Accelerator ordinals; the first one is used
    pub gpu_nodes: Vec<usize>,
    /// Program performing the formatting pass
    pub format_converter: Option<PathBuf>,
}

impl PredictionConfig {
    pub const DEFAULT_EVAL_BATCH_SIZE: usize = 8;
    pub const DEFAULT_MAX_SEQ_LENGTH: usize = 128;

    /// Create a configuration with the required paths and default settings.
    pub fn new(
        model_type: ModelType,
        pretrained_model: impl Into<PathBuf>,
        preprocessed_text_dir: impl Into<PathBuf>,
        raw_text_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model_type,
            pretrained_model: pretrained_model.into(),
            preprocessed_text_dir: preprocessed_text_dir.into(),
            raw_text_dir: raw_text_dir.into(),
            data_has_offset_information: false,
            output_dir: output_dir.into(),
            output_dir_formatted: None,
            do_lower_case: false,
            eval_batch_size: Self::DEFAULT_EVAL_BATCH_SIZE,
            max_seq_length: Self::DEFAULT_MAX_SEQ_LENGTH,
            output_format: OutputFormat::Bio,
            do_copy: false,
            progress_bar: false,
            use_bio: false,
            gpu_nodes: Vec::new(),
            format_converter: None,
        }
    }

    pub fn with_offset_information(mut self, enabled: bool) -> Self {
        self.data_has_offset_information = enabled;
        self
    }

    pub fn with_formatted_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir_formatted = dir;
        self
    }

    pub fn with_lower_case(mut self, enabled: bool) -> Self {
        self.do_lower_case = enabled;
        self
    }

    pub fn with_eval_batch_size(mut self, size: usize) -> Self {
        self.eval_batch_size = size;
        self
    }

    pub fn with_max_seq_length(mut self, len: usize) -> Self {
        self.max_seq_length = len;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_copy_text(mut self, enabled: bool) -> Self {
        self.do_copy = enabled;
        self
    }

    pub fn with_progress_bar(mut self, enabled: bool) -> Self {
        self.progress_bar = enabled;
        self
    }

    pub fn with_use_bio(mut self, enabled: bool) -> Self {
        self.use_bio = enabled;
        self
    }

    pub fn with_gpu_nodes(mut self, nodes: Vec<usize>) -> Self {
        self.gpu_nodes = nodes;
        self
    }

    pub fn with_format_converter(mut self, program: Option<PathBuf>) -> Self {
        self.format_converter = program;
        self
    }

    /// Directory receiving the formatting pass output: the explicit one, or
    /// `<output_dir parent>/<output_dir stem>_formatted_output`.
    pub fn formatted_output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir_formatted {
            return dir.clone();
        }
        let stem = self
            .output_dir
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = self.output_dir.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{stem}_formatted_output"))
    }

    /// Check paths and numeric settings before anything is loaded.
    ///
    /// # Errors
    ///
    /// Returns `NerError::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_dir(&self.pretrained_model, "pretrained model")?;
        let labels = self.pretrained_model.join(LABEL_FILE);
        if !labels.is_file() {
            return Err(NerError::Configuration(format!(
                "label vocabulary {} not found",
                labels.display()
            )));
        }
        require_dir(&self.preprocessed_text_dir, "preprocessed text")?;

        if self.eval_batch_size == 0 {
            return Err(NerError::Configuration(
                "eval batch size must be at least 1".into(),
            ));
        }
        if self.max_seq_length < 3 {
            return Err(NerError::Configuration(format!(
                "max sequence length {} must be at least 3",
                self.max_seq_length
            )));
        }

        if self.output_format.requires_conversion() {
            require_dir(&self.raw_text_dir, "raw text")?;
            if self.format_converter.is_none() {
                return Err(NerError::Configuration(format!(
                    "{} output requested but no format converter program is configured",
                    self.output_format
                )));
            }
        }

        Ok(())
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(NerError::Configuration(format!(
            "{what} directory {} does not exist",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> (tempfile::TempDir, PredictionConfig) {
        let root = tempfile::tempdir().unwrap();
        let model = root.path().join("model");
        let input = root.path().join("input");
        let raw = root.path().join("raw");
        fs::create_dir_all(&model).unwrap();
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&raw).unwrap();
        fs::write(model.join(LABEL_FILE), r#"{"O": 0}"#).unwrap();

        let config = PredictionConfig::new(
            ModelType::Bert,
            model,
            input,
            raw,
            root.path().join("out").join("bio"),
        );
        (root, config)
    }

    #[test]
    fn test_model_type_parsing() {
        assert_eq!("bert".parse::<ModelType>().unwrap(), ModelType::Bert);
        assert_eq!("DistilBERT".parse::<ModelType>().unwrap(), ModelType::Distilbert);
        assert!("gpt2".parse::<ModelType>().is_err());
        for model in ModelType::all() {
            assert_eq!(model.to_string().parse::<ModelType>().unwrap(), *model);
        }
    }

    #[test]
    fn test_special_tokens_by_family() {
        assert_eq!(ModelType::Bert.special_tokens().cls, "[CLS]");
        assert_eq!(ModelType::Roberta.special_tokens().sep, "</s>");
        assert_eq!(ModelType::Albert.special_tokens().pad, "<pad>");
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("0".parse::<OutputFormat>().unwrap(), OutputFormat::Bio);
        assert_eq!("1".parse::<OutputFormat>().unwrap(), OutputFormat::Brat);
        assert_eq!("bioc".parse::<OutputFormat>().unwrap(), OutputFormat::Bioc);
        assert!("3".parse::<OutputFormat>().is_err());
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Bioc.code(), 2);
        assert!(!OutputFormat::Bio.requires_conversion());
    }

    #[test]
    fn test_defaults() {
        let config = PredictionConfig::new(ModelType::Bert, "m", "i", "r", "o");
        assert_eq!(config.eval_batch_size, 8);
        assert_eq!(config.max_seq_length, 128);
        assert!(!config.use_bio);
        assert_eq!(config.output_format, OutputFormat::Bio);
    }

    #[test]
    fn test_formatted_output_dir_derivation() {
        let config = PredictionConfig::new(ModelType::Bert, "m", "i", "r", "/data/run1/bio_out");
        assert_eq!(
            config.formatted_output_dir(),
            PathBuf::from("/data/run1/bio_out_formatted_output")
        );

        let config = config.with_formatted_output_dir(Some(PathBuf::from("/tmp/brat")));
        assert_eq!(config.formatted_output_dir(), PathBuf::from("/tmp/brat"));
    }

    #[test]
    fn test_validate_ok() {
        let (_root, config) = layout();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_missing_labels() {
        let (_root, config) = layout();
        fs::remove_file(config.pretrained_model.join(LABEL_FILE)).unwrap();
        assert!(config.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn test_validate_numeric_limits() {
        let (_root, config) = layout();
        assert!(config.clone().with_eval_batch_size(0).validate().is_err());
        assert!(config.with_max_seq_length(2).validate().is_err());
    }

    #[test]
    fn test_validate_formatting_needs_converter() {
        let (_root, config) = layout();
        let config = config.with_output_format(OutputFormat::Brat);
        assert!(config.validate().is_err());

        let config = config.with_format_converter(Some(PathBuf::from("bio2brat")));
        config.validate().unwrap();
    }
}
