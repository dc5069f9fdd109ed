use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

static PAPER_DIR: Dir = include_dir!("src/papers");

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub prompt: String,
}

/// One assessment as served by the catalog. Immutable once loaded; a
/// session only ever reads from it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AssessmentDefinition {
    pub id: String,
    pub title: String,
    pub time_limit_minutes: u64,
    pub questions: Vec<Question>,
}

impl AssessmentDefinition {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// A session cannot start on a paper without questions or without a
    /// time limit.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.questions.is_empty() {
            return Err(CatalogError::Invalid {
                id: self.id.clone(),
                reason: "no questions".into(),
            });
        }
        if self.time_limit_minutes == 0 {
            return Err(CatalogError::Invalid {
                id: self.id.clone(),
                reason: "time limit must be at least one minute".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not read paper file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed assessment definition: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid assessment '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// Papers bundled into the binary for offline / practice runs.
pub fn sample_papers() -> Vec<AssessmentDefinition> {
    let mut papers: Vec<AssessmentDefinition> = PAPER_DIR
        .files()
        .filter(|f| f.path().extension().is_some_and(|e| e == "json"))
        .map(|f| {
            let text = f
                .contents_utf8()
                .expect("bundled paper is not valid UTF-8");
            serde_json::from_str(text).expect("bundled paper does not deserialize")
        })
        .collect();
    papers.sort_by(|a: &AssessmentDefinition, b: &AssessmentDefinition| a.id.cmp(&b.id));
    papers
}

/// Load a single paper from a JSON file on disk.
pub fn load_paper(path: &Path) -> Result<AssessmentDefinition, CatalogError> {
    let text = std::fs::read_to_string(path)?;
    let paper: AssessmentDefinition = serde_json::from_str(&text)?;
    paper.validate()?;
    Ok(paper)
}

/// Read-only client for the assessment catalog service. The returned
/// sequence is finite and unpaginated.
#[derive(Debug)]
pub struct HttpCatalog {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn list(&self) -> Result<Vec<AssessmentDefinition>, CatalogError> {
        let url = format!("{}/api/assessments", self.base_url.trim_end_matches('/'));
        let papers: Vec<AssessmentDefinition> =
            self.client.get(url).send()?.error_for_status()?.json()?;
        Ok(papers)
    }
}
