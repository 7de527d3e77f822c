//! # nerbatch core
//!
//! Batch named-entity recognition over directories of documents. Inputs are
//! split into sentences, encoded into fixed-length features, run through a
//! candle token classifier, and folded back into one BIO label per word.
//!
//! ## Quick Start
//!
//! ```rust
//! use nerbatch_core::bio::{render_bio, LabeledSentence, LabeledToken};
//!
//! let sentence = LabeledSentence {
//!     tokens: vec![LabeledToken {
//!         text: "Paris".into(),
//!         start: 14,
//!         end: 19,
//!         label: "B-LOC".into(),
//!     }],
//! };
//!
//! assert_eq!(render_bio(&[sentence]), "Paris\tB-LOC\n\n");
//! ```
pub mod bio;
pub mod config;
pub mod crf;
pub mod data;
pub mod error;
pub mod features;
pub mod format;
pub mod inference;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod sink;

// Re-export primary API
pub use bio::{output_bio, render_bio, LabeledSentence, LabeledToken};
pub use config::{ModelType, OutputFormat, PredictionConfig};
pub use crf::ViterbiDecoder;
pub use data::{DataProcessor, TestExample, Token};
pub use error::{error_chain, NerError, Result};
pub use features::{convert_examples_to_features, Feature, HfWordTokenizer, WordTokenizer};
pub use format::{ExternalFormatConverter, FormatConverter, FormatRequest};
pub use inference::{select_device, InferenceRunner, Prediction};
pub use labels::{BioTag, LabelVocabulary};
pub use model::{EncodedBatch, TokenClassifier};
pub use pipeline::{BatchOrchestrator, FileResult, FileState, RunContext, RunSummary};
pub use sink::{FileSink, LabeledDocument, MemorySink, OutputSink};
