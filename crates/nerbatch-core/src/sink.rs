//! # Output Sinks
//!
//! Where labeled sentences go once a file has been predicted: straight to
//! `<stem>.bio.txt` on disk, or into memory for the formatting pass.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bio::{render_bio, LabeledSentence};
use crate::error::{NerError, Result};

/// Suffix of per-document BIO output files.
pub const BIO_SUFFIX: &str = ".bio.txt";

/// Predictions of one input file kept for the formatting pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledDocument {
    pub sents: Vec<LabeledSentence>,
    pub raw_text: String,
}

/// Receiver of per-file results.
pub trait OutputSink {
    /// Store the labeled sentences of `file_name`.
    fn write(&mut self, file_name: &str, sentences: &[LabeledSentence], raw_text: &str) -> Result<()>;

    /// Hand over the documents held in memory, if any.
    fn take_documents(&mut self) -> BTreeMap<String, LabeledDocument> {
        BTreeMap::new()
    }
}

/// `<stem>.bio.txt`, where the stem is the file name up to its first `.`.
///
/// ```
/// use nerbatch_core::sink::bio_file_name;
///
/// assert_eq!(bio_file_name("doc1.txt"), "doc1.bio.txt");
/// assert_eq!(bio_file_name("report.v2.txt"), "report.bio.txt");
/// ```
pub fn bio_file_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("{stem}{BIO_SUFFIX}")
}

/// Writes each document to `<output_dir>/<stem>.bio.txt`.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    /// Create the sink, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| NerError::file(&output_dir, e))?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl OutputSink for FileSink {
    fn write(&mut self, file_name: &str, sentences: &[LabeledSentence], _raw_text: &str) -> Result<()> {
        let target = self.output_dir.join(bio_file_name(file_name));
        let tmp = self
            .output_dir
            .join(format!(".{}.tmp", bio_file_name(file_name)));

        let rendered = render_bio(sentences);
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(rendered.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &target));

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(NerError::file(target, e));
        }

        tracing::debug!(path = %target.display(), "wrote BIO output");
        Ok(())
    }
}

/// Keeps every document in memory, keyed by input file name.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    documents: BTreeMap<String, LabeledDocument>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &BTreeMap<String, LabeledDocument> {
        &self.documents
    }

    pub fn into_documents(self) -> BTreeMap<String, LabeledDocument> {
        self.documents
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, file_name: &str, sentences: &[LabeledSentence], raw_text: &str) -> Result<()> {
        self.documents.insert(
            file_name.to_string(),
            LabeledDocument {
                sents: sentences.to_vec(),
                raw_text: raw_text.to_string(),
            },
        );
        Ok(())
    }

    fn take_documents(&mut self) -> BTreeMap<String, LabeledDocument> {
        std::mem::take(&mut self.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::LabeledToken;

    fn sentence() -> Vec<LabeledSentence> {
        vec![LabeledSentence {
            tokens: vec![
                LabeledToken {
                    text: "John".into(),
                    start: 0,
                    end: 4,
                    label: "B-PER".into(),
                },
                LabeledToken {
                    text: "lives".into(),
                    start: 5,
                    end: 10,
                    label: "O".into(),
                },
            ],
        }]
    }

    #[test]
    fn test_bio_file_name() {
        assert_eq!(bio_file_name("doc1.txt"), "doc1.bio.txt");
        assert_eq!(bio_file_name("a.b.c.txt"), "a.bio.txt");
        assert_eq!(bio_file_name("noext"), "noext.bio.txt");
    }

    #[test]
    fn test_file_sink_writes_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("bio");
        let mut sink = FileSink::new(&out).unwrap();

        sink.write("doc1.txt", &sentence(), "").unwrap();

        let written = fs::read_to_string(out.join("doc1.bio.txt")).unwrap();
        assert_eq!(written, "John\tB-PER\nlives\tO\n\n");
        let entries: Vec<_> = fs::read_dir(&out).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_file_sink_failed_rename_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path()).unwrap();
        let blocked = dir.path().join("doc1.bio.txt");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), "x").unwrap();

        let err = sink.write("doc1.txt", &sentence(), "").unwrap_err();
        assert!(matches!(err, NerError::File { .. }));

        assert!(blocked.is_dir());
        assert!(!dir.path().join(".doc1.bio.txt.tmp").exists());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc1.bio.txt")]);
    }

    #[test]
    fn test_file_sink_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path()).unwrap();
        sink.write("doc1.txt", &sentence(), "").unwrap();
        sink.write("doc1.txt", &[], "").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("doc1.bio.txt")).unwrap(), "");
    }

    #[test]
    fn test_file_sink_has_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path()).unwrap();
        assert!(sink.take_documents().is_empty());
    }

    #[test]
    fn test_memory_sink_keeps_documents() {
        let mut sink = MemorySink::new();
        sink.write("doc1.txt", &sentence(), "John lives").unwrap();

        assert_eq!(sink.documents()["doc1.txt"].raw_text, "John lives");
        let docs = sink.take_documents();
        assert_eq!(docs["doc1.txt"].sents.len(), 1);
        assert!(sink.documents().is_empty());
    }
}
