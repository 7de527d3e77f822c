//! # Format Conversion
//!
//! Optional post-pass handing BIO predictions to an annotation-format
//! converter (brat standoff or BioC). The converter itself is an external
//! program; this module builds its request and runs it.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::config::{OutputFormat, PredictionConfig};
use crate::error::{NerError, Result};
use crate::sink::LabeledDocument;

/// Everything the converter needs to produce formatted annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRequest {
    /// Source documents
    pub text_dir: PathBuf,
    /// Directory of BIO files (or raw text when predictions are in memory)
    pub input_bio_dir: PathBuf,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub do_copy_text: bool,
    pub use_bio: bool,
    /// In-memory predictions keyed by input file name; empty with `use_bio`
    pub labeled_documents: BTreeMap<String, LabeledDocument>,
}

impl FormatRequest {
    pub fn new(config: &PredictionConfig, labeled_documents: BTreeMap<String, LabeledDocument>) -> Self {
        let input_bio_dir = if config.use_bio {
            config.output_dir.clone()
        } else {
            config.raw_text_dir.clone()
        };

        Self {
            text_dir: config.raw_text_dir.clone(),
            input_bio_dir,
            output_dir: config.formatted_output_dir(),
            format: config.output_format,
            do_copy_text: config.do_copy,
            use_bio: config.use_bio,
            labeled_documents,
        }
    }
}

/// Turns BIO predictions into a target annotation format.
pub trait FormatConverter {
    fn convert(&self, request: &FormatRequest) -> Result<()>;
}

/// Runs a converter program with the request as JSON on its stdin.
///
/// The program also receives `NERBATCH_FORMAT`, `NERBATCH_OUTPUT_DIR` and
/// `NERBATCH_TEXT_DIR` in its environment.
#[derive(Debug, Clone)]
pub struct ExternalFormatConverter {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalFormatConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl FormatConverter for ExternalFormatConverter {
    fn convert(&self, request: &FormatRequest) -> Result<()> {
        fs::create_dir_all(&request.output_dir)
            .map_err(|e| NerError::file(&request.output_dir, e))?;
        let payload = serde_json::to_vec(request)?;

        tracing::info!(
            program = %self.program.display(),
            format = %request.format,
            output_dir = %request.output_dir.display(),
            documents = request.labeled_documents.len(),
            "running format converter"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("NERBATCH_FORMAT", request.format.to_string())
            .env("NERBATCH_OUTPUT_DIR", &request.output_dir)
            .env("NERBATCH_TEXT_DIR", &request.text_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                NerError::Format(format!("cannot start {}: {e}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A converter may exit without reading its input; its status decides.
            if let Err(e) = stdin.write_all(&payload) {
                tracing::debug!(error = %e, "format converter closed stdin early");
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| NerError::Format(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NerError::Format(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
