//! # Batch Orchestrator
//!
//! Runs every input file through processing, feature conversion, inference
//! and BIO output. A failing file is logged and recorded; the batch always
//! moves on to the next one.

use std::fmt;
use std::path::Path;

use candle_core::Device;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use crate::bio::output_bio;
use crate::config::PredictionConfig;
use crate::data::DataProcessor;
use crate::error::{error_chain, NerError, Result};
use crate::features::{convert_examples_to_features, HfWordTokenizer, WordTokenizer};
use crate::inference::InferenceRunner;
use crate::labels::LabelVocabulary;
use crate::model::{load_token_classifier, TokenClassifier};
use crate::sink::OutputSink;

/// File name of the serialized tokenizer inside the model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Objects loaded once per run and shared read-only by every file.
pub struct RunContext {
    pub vocab: LabelVocabulary,
    pub tokenizer: Box<dyn WordTokenizer>,
    pub model: Box<dyn TokenClassifier>,
    pub runner: InferenceRunner,
}

impl RunContext {
    pub fn new(
        vocab: LabelVocabulary,
        tokenizer: Box<dyn WordTokenizer>,
        model: Box<dyn TokenClassifier>,
        runner: InferenceRunner,
    ) -> Self {
        Self {
            vocab,
            tokenizer,
            model,
            runner,
        }
    }

    /// Load the label vocabulary, tokenizer and model named by `config` onto `device`.
    ///
    /// # Errors
    ///
    /// Every failure here is fatal: `NerError::Configuration` or `NerError::ModelLoad`.
    pub fn load(config: &PredictionConfig, device: Device) -> Result<Self> {
        let model_dir = config.pretrained_model.as_path();
        let vocab = LabelVocabulary::load(model_dir)?;
        info!(labels = vocab.len(), "label vocabulary loaded");

        let tokenizer = HfWordTokenizer::from_file(
            &model_dir.join(TOKENIZER_FILE),
            config.model_type,
            config.do_lower_case,
        )?;
        let model = load_token_classifier(model_dir, config.model_type, vocab.len(), &device)?;
        if model.crf_transitions().is_none() {
            debug!("model has no CRF layer, decoding by arg-max");
        }

        Ok(Self::new(
            vocab,
            Box::new(tokenizer),
            model,
            InferenceRunner::new(config.eval_batch_size, device),
        ))
    }
}

/// Lifecycle of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::Pending => "pending",
            FileState::Processing => "processing",
            FileState::Done => "done",
            FileState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one input file.
#[derive(Debug)]
pub enum FileResult {
    Success {
        file: String,
        sentences: usize,
        tokens: usize,
    },
    Failure {
        file: String,
        error: NerError,
    },
}

impl FileResult {
    pub fn file(&self) -> &str {
        match self {
            FileResult::Success { file, .. } | FileResult::Failure { file, .. } => file,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileResult::Success { .. })
    }

    /// Terminal state the file ended in.
    pub fn state(&self) -> FileState {
        if self.is_success() {
            FileState::Done
        } else {
            FileState::Failed
        }
    }
}

/// Per-file outcomes of a run, in processing order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<FileResult>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Tokens labeled across all successful files.
    pub fn tokens(&self) -> usize {
        self.results
            .iter()
            .map(|r| match r {
                FileResult::Success { tokens, .. } => *tokens,
                FileResult::Failure { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &NerError)> {
        self.results.iter().filter_map(|r| match r {
            FileResult::Failure { file, error } => Some((file.as_str(), error)),
            FileResult::Success { .. } => None,
        })
    }

    /// `true` when there were files and none of them succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }

    /// Process exit code for the run: `1` on total failure, `0` otherwise.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.is_total_failure())
    }
}

/// Drives a run over every input file.
pub struct BatchOrchestrator<'a> {
    config: &'a PredictionConfig,
    context: &'a RunContext,
    processor: DataProcessor,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(config: &'a PredictionConfig, context: &'a RunContext) -> Result<Self> {
        let processor = DataProcessor::new(&config.preprocessed_text_dir)?
            .with_offset_information(config.data_has_offset_information);
        Ok(Self {
            config,
            context,
            processor,
        })
    }

    /// Process all `*.txt` files in sorted order, sending results to `sink`.
    ///
    /// # Errors
    ///
    /// Only fails when the input directory cannot be listed; per-file
    /// errors are recorded in the summary.
    pub fn run(&self, sink: &mut dyn OutputSink) -> Result<RunSummary> {
        let files = self.processor.list_input_files()?;
        info!(
            files = files.len(),
            dir = %self.processor.data_dir().display(),
            "starting batch prediction"
        );

        let progress = self.progress_bar(files.len() as u64);
        let mut summary = RunSummary {
            results: Vec::with_capacity(files.len()),
        };

        for path in &files {
            let file = file_name(path);
            progress.set_message(file.clone());
            debug!(file = %file, state = %FileState::Processing, "file state");

            let result = match self.process_file(&file, sink) {
                Ok((sentences, tokens)) => {
                    info!(file = %file, sentences, tokens, "file predicted");
                    FileResult::Success {
                        file,
                        sentences,
                        tokens,
                    }
                }
                Err(e) => {
                    error!(file = %file, "encountered an error when processing predictions");
                    error!("{}", error_chain(&e));
                    FileResult::Failure { file, error: e }
                }
            };
            debug!(file = %result.file(), state = %result.state(), "file state");

            summary.results.push(result);
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            total = summary.total(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            tokens = summary.tokens(),
            "batch prediction finished"
        );

        Ok(summary)
    }

    /// Predict a single file and hand its sentences to `sink`.
    ///
    /// Returns the number of sentences and tokens written.
    pub fn process_file(&self, file: &str, sink: &mut dyn OutputSink) -> Result<(usize, usize)> {
        let ctx = self.context;
        let content = self.processor.read_document(file)?;
        let examples = self.processor.examples_from_content(&content, self.config.use_bio)?;

        let features = convert_examples_to_features(
            &examples,
            ctx.tokenizer.as_ref(),
            &ctx.vocab,
            self.config.max_seq_length,
        )?;
        debug!(file, examples = examples.len(), features = features.len(), "features built");

        let predictions = ctx.runner.predict(ctx.model.as_ref(), &features, &ctx.vocab)?;
        let sentences = output_bio(&examples, &features, &predictions, &ctx.vocab)?;
        sink.write(file, &sentences, &content)?;

        let tokens = sentences.iter().map(|s| s.len()).sum();
        Ok((sentences.len(), tokens))
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.progress_bar {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(file: &str, tokens: usize) -> FileResult {
        FileResult::Success {
            file: file.into(),
            sentences: 1,
            tokens,
        }
    }

    fn failure(file: &str) -> FileResult {
        FileResult::Failure {
            file: file.into(),
            error: NerError::MalformedInput {
                line: 1,
                reason: "bad".into(),
            },
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            results: vec![success("a.txt", 4), failure("b.txt"), success("c.txt", 6)],
        };
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.tokens(), 10);
        assert_eq!(summary.failures().map(|(f, _)| f).collect::<Vec<_>>(), vec!["b.txt"]);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_exit_code_on_total_failure() {
        let summary = RunSummary {
            results: vec![failure("a.txt"), failure("b.txt")],
        };
        assert!(summary.is_total_failure());
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_empty_run_is_not_a_failure() {
        let summary = RunSummary::default();
        assert!(!summary.is_total_failure());
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_file_result_state() {
        assert_eq!(success("a.txt", 1).state(), FileState::Done);
        assert_eq!(failure("a.txt").state(), FileState::Failed);
        assert_eq!(FileState::Pending.to_string(), "pending");
    }
}
