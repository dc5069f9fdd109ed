use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app_dirs::AppDirs;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AnswerEntry {
    pub question_index: usize,
    pub answer_text: String,
}

/// The one record a finished session produces. Answers are in original
/// question order regardless of how they were presented.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SubmissionPayload {
    pub test_id: String,
    pub answers: Vec<AnswerEntry>,
    pub elapsed_seconds: u64,
    pub fullscreen_exit_count: u32,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Server answered with a failure; carries the literal server
    /// message when one was provided.
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("submission request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not write local receipt: {0}")]
    Receipt(#[from] std::io::Error),
    #[error("could not encode submission: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where a finished payload goes. Delivery happens after the session is
/// already Submitted; a failure here is terminal for the attempt and is
/// never retried automatically.
pub trait SubmissionSink {
    fn deliver(&self, payload: &SubmissionPayload) -> Result<(), SubmitError>;
}

/// Posts the payload to the submission service.
#[derive(Debug)]
pub struct HttpSink {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl SubmissionSink for HttpSink {
    fn deliver(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        let url = format!(
            "{}/api/assessments/{}/submissions",
            self.base_url.trim_end_matches('/'),
            payload.test_id
        );
        let response = self.client.post(url).json(payload).send()?;

        if response.status().is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "the submission service reported a failure".to_string());
        Err(SubmitError::Rejected(message))
    }
}

/// Writes the payload as a JSON receipt under the state directory. Used
/// directly for offline papers, and as the fallback keeper of a payload
/// whose network delivery failed (so a supervised resubmission stays
/// possible out of band).
#[derive(Debug)]
pub struct LocalSink {
    dir: PathBuf,
}

impl LocalSink {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let dir = AppDirs::receipt_dir().unwrap_or_else(|| PathBuf::from("invigil_receipts"));
        Self { dir }
    }

    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn receipt_path(&self, payload: &SubmissionPayload) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        self.dir
            .join(format!("{}-{}.json", payload.test_id, stamp))
    }
}

impl SubmissionSink for LocalSink {
    fn deliver(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        std::fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec_pretty(payload)?;
        std::fs::write(self.receipt_path(payload), data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            test_id: "exam-9".into(),
            answers: vec![
                AnswerEntry {
                    question_index: 0,
                    answer_text: "Paris".into(),
                },
                AnswerEntry {
                    question_index: 1,
                    answer_text: "".into(),
                },
            ],
            elapsed_seconds: 61,
            fullscreen_exit_count: 2,
        }
    }

    #[test]
    fn test_payload_serialization_shape() {
        let json = serde_json::to_value(payload()).unwrap();

        assert_eq!(json["test_id"], "exam-9");
        assert_eq!(json["elapsed_seconds"], 61);
        assert_eq!(json["fullscreen_exit_count"], 2);
        assert_eq!(json["answers"][0]["question_index"], 0);
        assert_eq!(json["answers"][0]["answer_text"], "Paris");
        assert_eq!(json["answers"][1]["answer_text"], "");
    }

    #[test]
    fn test_local_sink_writes_receipt() {
        let dir = tempdir().unwrap();
        let sink = LocalSink::with_dir(dir.path());

        sink.deliver(&payload()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let written = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let round: SubmissionPayload = serde_json::from_str(&written).unwrap();
        assert_eq!(round, payload());
    }

    #[test]
    fn test_local_sink_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let sink = LocalSink::with_dir(dir.path().join("nested").join("receipts"));

        sink.deliver(&payload()).unwrap();

        assert!(dir.path().join("nested").join("receipts").exists());
    }

    #[test]
    fn test_http_sink_transport_error() {
        // Nothing listens on this port; delivery must fail as Transport
        let sink = HttpSink::new("http://127.0.0.1:9");
        let err = sink.deliver(&payload()).unwrap_err();
        assert!(matches!(err, SubmitError::Transport(_)));
    }
}
