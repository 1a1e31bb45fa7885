//! Response types returned by the classification pipeline.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Deduplicated domain labels predicted for one document.
///
/// Serialises as `{"prediction": ["Neurology", "Radiology"]}`. Labels are
/// held in a set, so duplicates across notes collapse; the emitted order is
/// lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: BTreeSet<String>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.prediction.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prediction.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.prediction.contains(label)
    }
}

impl<S: Into<String>> FromIterator<S> for Prediction {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            prediction: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-document result of the partial-success endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    /// Upload filename, or `document-{index}` when the part had none.
    pub filename: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Tagged success/failure for one document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok {
        #[serde(flatten)]
        prediction: Prediction,
    },
    Error {
        detail: String,
        #[serde(skip)]
        error: Option<DocumentError>,
    },
}

impl DocumentOutcome {
    pub fn ok(filename: impl Into<String>, prediction: Prediction) -> Self {
        Self {
            filename: filename.into(),
            status: OutcomeStatus::Ok { prediction },
        }
    }

    pub fn failed(filename: impl Into<String>, error: DocumentError) -> Self {
        Self {
            filename: filename.into(),
            status: OutcomeStatus::Error {
                detail: error.to_string(),
                error: Some(error),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, OutcomeStatus::Ok { .. })
    }

    /// The prediction, if this document succeeded.
    pub fn prediction(&self) -> Option<&Prediction> {
        match &self.status {
            OutcomeStatus::Ok { prediction } => Some(prediction),
            OutcomeStatus::Error { .. } => None,
        }
    }
}
