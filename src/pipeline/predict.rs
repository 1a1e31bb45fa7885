//! Domain prediction: TF-IDF features fed to a linear classifier.
//!
//! The two artifacts are JSON exports of a fitted scikit-learn
//! `TfidfVectorizer` and linear classifier (`LogisticRegression`,
//! `LinearSVC`, `SGDClassifier`, `RidgeClassifier`). Both are deserialized
//! and cross-checked eagerly in [`DomainPredictor::load`], so a missing or
//! inconsistent artifact stops the process at startup instead of failing
//! the first request.
//!
//! Inference reproduces scikit-learn's defaults exactly: lowercase, the
//! `(?u)\b\w\w+\b` token pattern, optional word n-grams, optional sublinear
//! TF, IDF weighting and L2 normalisation, then `argmax(coef · x + intercept)`.

use crate::error::{ClassifierError, DocumentError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Maps one text to one domain label.
///
/// Implementations must be deterministic and safe to share across
/// concurrent requests.
pub trait DomainClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Result<String, DocumentError>;
}

/// A loaded vectorizer + classifier pair.
#[derive(Debug)]
pub struct DomainPredictor {
    vectorizer: TfidfVectorizer,
    classifier: LinearClassifier,
}

impl DomainPredictor {
    /// Load both artifacts from disk and check they fit together.
    pub fn load(
        model_path: impl AsRef<Path>,
        vectorizer_path: impl AsRef<Path>,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let vectorizer_path = vectorizer_path.as_ref();

        let vectorizer: TfidfVectorizer = load_json(vectorizer_path)?;
        vectorizer.validate().map_err(|detail| ClassifierError::Artifact {
            path: vectorizer_path.to_path_buf(),
            detail,
        })?;

        let classifier: LinearClassifier = load_json(model_path)?;
        classifier
            .validate(vectorizer.n_features())
            .map_err(|detail| ClassifierError::Artifact {
                path: model_path.to_path_buf(),
                detail,
            })?;

        info!(
            "Loaded domain predictor: {} features, classes {:?}",
            vectorizer.n_features(),
            classifier.classes
        );

        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    /// Build from already-deserialized parts (validated the same way).
    pub fn from_parts(
        vectorizer: TfidfVectorizer,
        classifier: LinearClassifier,
    ) -> Result<Self, ClassifierError> {
        vectorizer
            .validate()
            .map_err(|detail| ClassifierError::Artifact {
                path: "<vectorizer>".into(),
                detail,
            })?;
        classifier
            .validate(vectorizer.n_features())
            .map_err(|detail| ClassifierError::Artifact {
                path: "<classifier>".into(),
                detail,
            })?;
        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    /// Labels the classifier can emit, in model order.
    pub fn classes(&self) -> &[String] {
        &self.classifier.classes
    }
}

impl DomainClassifier for DomainPredictor {
    fn predict(&self, text: &str) -> Result<String, DocumentError> {
        let features = self.vectorizer.transform(text);
        debug!("Vectorized {} chars into {} non-zero features", text.len(), features.len());
        self.classifier
            .predict(&features)
            .map(str::to_string)
            .ok_or_else(|| DocumentError::Prediction {
                detail: "classifier produced no decision".to_string(),
            })
    }
}

// ── Vectorizer ───────────────────────────────────────────────────────────

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Sparse feature vector: (column, value) pairs, columns unique.
pub type SparseVector = Vec<(usize, f64)>;

/// Row normalisation applied after weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// Exported `TfidfVectorizer` state.
#[derive(Debug, Clone, Deserialize)]
pub struct TfidfVectorizer {
    /// Term (or space-joined n-gram) → feature column.
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column.
    pub idf: Vec<f64>,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
    #[serde(default = "default_true")]
    pub use_idf: bool,
}

fn default_true() -> bool {
    true
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

impl TfidfVectorizer {
    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.vocabulary.values().max().map_or(0, |m| m + 1).max(self.idf.len())
    }

    fn validate(&self) -> Result<(), String> {
        if self.vocabulary.is_empty() {
            return Err("vocabulary is empty".into());
        }
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(format!("invalid ngram_range ({lo}, {hi})"));
        }
        if self.use_idf {
            let max_col = self.vocabulary.values().max().copied().unwrap_or(0);
            if self.idf.len() <= max_col {
                return Err(format!(
                    "idf has {} entries but vocabulary references column {}",
                    self.idf.len(),
                    max_col
                ));
            }
        }
        Ok(())
    }

    /// Tokenize a document the way scikit-learn's default analyzer does.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens: Vec<&str> = RE_TOKEN.find_iter(&text).map(|m| m.as_str()).collect();

        let (lo, hi) = self.ngram_range;
        let mut grams = Vec::new();
        for n in lo..=hi {
            if n == 1 {
                grams.extend(tokens.iter().map(|t| t.to_string()));
            } else if tokens.len() >= n {
                grams.extend(tokens.windows(n).map(|w| w.join(" ")));
            }
        }
        grams
    }

    /// Transform one document into a weighted, normalised sparse vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for gram in self.analyze(text) {
            if let Some(&col) = self.vocabulary.get(&gram) {
                *counts.entry(col).or_default() += 1.0;
            }
        }

        let mut features: SparseVector = counts
            .into_iter()
            .map(|(col, tf)| {
                let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
                let weight = if self.use_idf { tf * self.idf[col] } else { tf };
                (col, weight)
            })
            .collect();
        features.sort_unstable_by_key(|(col, _)| *col);

        let norm = match self.norm {
            Some(Norm::L2) => features.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => features.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            None => 1.0,
        };
        if norm > 0.0 {
            for (_, v) in features.iter_mut() {
                *v /= norm;
            }
        }
        features
    }
}

// ── Classifier ───────────────────────────────────────────────────────────

/// Exported linear classifier state.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearClassifier {
    /// Labels, in the column order of `coef`.
    pub classes: Vec<String>,
    /// One row per class (or a single row for binary problems).
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearClassifier {
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.classes.len() < 2 {
            return Err(format!("need at least 2 classes, got {}", self.classes.len()));
        }
        let binary = self.coef.len() == 1 && self.classes.len() == 2;
        if !binary && self.coef.len() != self.classes.len() {
            return Err(format!(
                "coef has {} rows for {} classes",
                self.coef.len(),
                self.classes.len()
            ));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(format!(
                "intercept has {} entries for {} coef rows",
                self.intercept.len(),
                self.coef.len()
            ));
        }
        if let Some((i, row)) = self
            .coef
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n_features)
        {
            return Err(format!(
                "coef row {} has {} columns, vectorizer produces {}",
                i,
                row.len(),
                n_features
            ));
        }
        Ok(())
    }

    /// Decision score per coef row.
    pub fn decision_function(&self, features: &[(usize, f64)]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| features.iter().map(|(col, v)| row[*col] * v).sum::<f64>() + b)
            .collect()
    }

    /// Predicted label, or None when there are no scores to compare.
    pub fn predict(&self, features: &[(usize, f64)]) -> Option<&str> {
        let scores = self.decision_function(features);
        let idx = if scores.len() == 1 {
            usize::from(scores[0] > 0.0)
        } else {
            let mut best: Option<(usize, f64)> = None;
            for (i, s) in scores.iter().enumerate() {
                match best {
                    Some((_, b)) if *s <= b => {}
                    _ => best = Some((i, *s)),
                }
            }
            best?.0
        };
        self.classes.get(idx).map(String::as_str)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ClassifierError> {
    let bytes = std::fs::read(path).map_err(|e| ClassifierError::Artifact {
        path: path.to_path_buf(),
        detail: format!("cannot read: {e}"),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ClassifierError::Artifact {
        path: path.to_path_buf(),
        detail: format!("cannot parse: {e}"),
    })
}
