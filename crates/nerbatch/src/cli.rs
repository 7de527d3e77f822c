//! Command line flags of `nerbatch-predict`.
//!
//! Long flags keep their underscore spelling (`--model_type`, `--output_dir`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use nerbatch_core::{ModelType, OutputFormat, PredictionConfig};
use tracing_subscriber::filter::LevelFilter;

/// Environment variable naming the format converter program.
pub const FORMAT_CONVERTER_ENV: &str = "NERBATCH_FORMAT_CONVERTER";

/// Verbosity selected by `--log_lvl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "d" | "debug" => Ok(LogLevel::Debug),
            "i" | "info" => Ok(LogLevel::Info),
            "w" | "warn" | "warning" => Ok(LogLevel::Warn),
            "e" | "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level {other:?}; use d, i, w or e")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = match self {
            LogLevel::Debug => "d",
            LogLevel::Info => "i",
            LogLevel::Warn => "w",
            LogLevel::Error => "e",
        };
        f.write_str(short)
    }
}

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "nerbatch-predict")]
#[command(about = "Run a fine-tuned NER model over a directory of documents and write BIO files")]
#[command(version)]
pub struct Cli {
    /// Model architecture: bert, roberta, xlnet, albert or distilbert
    #[arg(long = "model_type", value_parser = parse_model_type)]
    pub model_type: ModelType,

    /// Directory of the fine-tuned model (weights, config.json, tokenizer.json, label2idx.json)
    #[arg(long = "pretrained_model")]
    pub pretrained_model: PathBuf,

    /// Directory of *.txt inputs (BIO with dummy labels, or raw text)
    #[arg(long = "preprocessed_text_dir")]
    pub preprocessed_text_dir: PathBuf,

    /// Directory of the source text used by the formatting pass
    #[arg(long = "raw_text_dir")]
    pub raw_text_dir: PathBuf,

    /// Input BIO lines carry start and end offset columns
    #[arg(long = "data_has_offset_information")]
    pub data_has_offset_information: bool,

    /// Directory receiving <stem>.bio.txt files
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    /// Formatting pass output directory. Default: <output_dir parent>/<output_dir stem>_formatted_output
    #[arg(long = "output_dir_brat")]
    pub output_dir_brat: Option<PathBuf>,

    /// Lower-case words before sub-word tokenization
    #[arg(long = "do_lower_case")]
    pub do_lower_case: bool,

    /// Number of features per forward pass
    #[arg(long = "eval_batch_size", default_value_t = PredictionConfig::DEFAULT_EVAL_BATCH_SIZE)]
    pub eval_batch_size: usize,

    /// Sequence length of every feature, special tokens included
    #[arg(long = "max_seq_length", default_value_t = PredictionConfig::DEFAULT_MAX_SEQ_LENGTH)]
    pub max_seq_length: usize,

    /// Also write logs to this file
    #[arg(long = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Log level: d, i, w or e
    #[arg(long = "log_lvl", default_value_t = LogLevel::Info)]
    pub log_lvl: LogLevel,

    /// 0=bio (no formatting); 1=brat; 2=bioc
    #[arg(long = "do_format", default_value = "0", value_parser = parse_output_format)]
    pub do_format: OutputFormat,

    /// Copy the source text next to the formatted annotations
    #[arg(long = "do_copy")]
    pub do_copy: bool,

    /// Show a progress bar over input files
    #[arg(long = "progress_bar")]
    pub progress_bar: bool,

    /// Inputs are pre-tokenized BIO written straight to disk; otherwise raw text kept for formatting
    #[arg(long = "use_bio")]
    pub use_bio: bool,

    /// Accelerator ordinals; the first one is used
    #[arg(long = "gpu_nodes", num_args = 1..)]
    pub gpu_nodes: Vec<usize>,

    /// Program performing the formatting pass (reads the request as JSON on stdin)
    #[arg(long = "format_converter", env = FORMAT_CONVERTER_ENV)]
    pub format_converter: Option<PathBuf>,
}

fn parse_model_type(value: &str) -> Result<ModelType, String> {
    value.parse().map_err(|e: nerbatch_core::NerError| e.to_string())
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse().map_err(|e: nerbatch_core::NerError| e.to_string())
}

impl Cli {
    /// Build the immutable run configuration from the parsed flags.
    pub fn to_config(&self) -> PredictionConfig {
        PredictionConfig::new(
            self.model_type,
            &self.pretrained_model,
            &self.preprocessed_text_dir,
            &self.raw_text_dir,
            &self.output_dir,
        )
        .with_offset_information(self.data_has_offset_information)
        .with_formatted_output_dir(self.output_dir_brat.clone())
        .with_lower_case(self.do_lower_case)
        .with_eval_batch_size(self.eval_batch_size)
        .with_max_seq_length(self.max_seq_length)
        .with_output_format(self.do_format)
        .with_copy_text(self.do_copy)
        .with_progress_bar(self.progress_bar)
        .with_use_bio(self.use_bio)
        .with_gpu_nodes(self.gpu_nodes.clone())
        .with_format_converter(self.format_converter.clone())
    }
}
