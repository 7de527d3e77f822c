use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during batch NER prediction.
#[derive(Debug, Error)]
pub enum NerError {
    /// A required path or flag is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The model, its config, or its tokenizer could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// An input file does not follow the expected token layout.
    #[error("malformed input at line {line}: {reason}")]
    MalformedInput {
        /// 1-based line number in the input file.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Examples could not be turned into model features.
    #[error("feature conversion error: {0}")]
    FeatureConversion(String),

    /// The forward pass or decoding failed.
    #[error("inference error: {0}")]
    Inference(String),

    /// The model predicted an index outside the label vocabulary.
    #[error("predicted label index {0} is not in the label vocabulary")]
    UnknownLabelIndex(usize),

    /// The sub-word tokenizer failed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The formatting pass failed.
    #[error("format conversion failed: {0}")]
    Format(String),

    /// Reading or writing a specific file failed.
    #[error("failed to access {path:?}")]
    File {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Candle ML framework error.
    #[error("ML inference error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NerError {
    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for errors that abort the run before any file is processed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ModelLoad(_))
    }
}

/// Result type alias for nerbatch operations.
pub type Result<T> = std::result::Result<T, NerError>;

/// Renders an error together with every `source()` below it, one cause per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = NerError::MalformedInput {
            line: 3,
            reason: "missing end offset".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed input at line 3: missing end offset"
        );

        let err = NerError::UnknownLabelIndex(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn fatal_classification() {
        assert!(NerError::Configuration("x".into()).is_fatal());
        assert!(NerError::ModelLoad("x".into()).is_fatal());
        assert!(!NerError::Inference("x".into()).is_fatal());
        assert!(
            !NerError::MalformedInput {
                line: 1,
                reason: "x".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = NerError::file("docs/a.txt", io);
        let chain = error_chain(&err);
        assert!(chain.contains("docs/a.txt"));
        assert!(chain.contains("caused by: no such file"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NerError>();
    }
}
