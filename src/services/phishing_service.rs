//! Inference over a pre-fit TF-IDF vectorizer and binary classifier.
//!
//! The artifact is a JSON export of the fitted scikit-learn objects:
//!
//! ```json
//! {
//!   "vectorizer": { "vocabulary": {"invoice": 0, ...}, "idf": [1.2, ...] },
//!   "classifier": { "kind": "logistic_regression", "coef": [...], "intercept": -0.3 }
//! }
//! ```
//!
//! Label `1` is phishing. No training happens here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScorerError {
    #[error("피싱 판별 모델 파일이 없습니다. (model_path={path})")]
    ModelMissing { path: String },

    #[error("피싱 판별 모델을 읽을 수 없습니다: {reason} (model_path={path})")]
    InvalidArtifact { path: String, reason: String },

    #[error("모델 특성 수가 맞지 않습니다: expected {expected}, found {found} (model_path={path})")]
    ShapeMismatch { path: String, expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    #[default]
    L2,
    L1,
    None,
}

fn default_true() -> bool {
    true
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorizerSpec {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default)]
    pub norm: Norm,
    #[serde(default)]
    pub token_pattern: Option<String>,
}

/// Per-node arrays in scikit-learn's `tree_` layout. Leaves have
/// `children_left == -1`; `value` holds class weights `[not_phishing, phishing]`.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression { coef: Vec<f64>, intercept: f64 },
    LinearSvc { coef: Vec<f64>, intercept: f64 },
    RandomForest { trees: Vec<DecisionTree> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub vectorizer: VectorizerSpec,
    pub classifier: Classifier,
}

/// Sparse row: `(feature index, weight)` sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    spec: VectorizerSpec,
    token_re: Regex,
}

impl TfidfVectorizer {
    fn new(spec: VectorizerSpec) -> Result<Self, String> {
        let pattern = spec.token_pattern.as_deref().unwrap_or(DEFAULT_TOKEN_PATTERN);
        let token_re = Regex::new(pattern).map_err(|e| format!("token_pattern: {}", e))?;
        if spec.ngram_range.0 == 0 || spec.ngram_range.0 > spec.ngram_range.1 {
            return Err(format!("invalid ngram_range {:?}", spec.ngram_range));
        }
        Ok(TfidfVectorizer { spec, token_re })
    }

    pub fn n_features(&self) -> usize {
        self.spec.idf.len()
    }

    fn max_vocabulary_index(&self) -> Option<usize> {
        self.spec.vocabulary.values().copied().max()
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let text = if self.spec.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        self.token_re.find_iter(&text).map(|m| m.as_str().to_string()).collect()
    }

    pub fn transform(&self, text: &str) -> SparseVector {
        let tokens = self.tokens(text);
        let (min_n, max_n) = self.spec.ngram_range;

        let mut counts: HashMap<usize, f64> = HashMap::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                let term = window.join(" ");
                if let Some(&idx) = self.spec.vocabulary.get(&term) {
                    *counts.entry(idx).or_insert(0.0) += 1.0;
                }
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(idx, count)| {
                let tf = if self.spec.sublinear_tf { 1.0 + count.ln() } else { count };
                (idx, tf * self.spec.idf[idx])
            })
            .collect();
        row.sort_by_key(|(idx, _)| *idx);

        let norm = match self.spec.norm {
            Norm::L2 => row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Norm::L1 => row.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            Norm::None => 1.0,
        };
        if norm > 0.0 {
            for (_, v) in row.iter_mut() {
                *v /= norm;
            }
        }
        row
    }
}

fn dot(coef: &[f64], row: &SparseVector) -> f64 {
    row.iter().map(|(idx, v)| coef[*idx] * v).sum()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl DecisionTree {
    fn leaf_distribution(&self, dense: &[f64]) -> [f64; 2] {
        let mut node = 0usize;
        while self.children_left[node] >= 0 {
            let feature = self.feature[node] as usize;
            node = if dense[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        let [a, b] = self.value[node];
        let total = a + b;
        if total > 0.0 {
            [a / total, b / total]
        } else {
            [0.5, 0.5]
        }
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        let nodes = self.children_left.len();
        if [self.children_right.len(), self.feature.len(), self.threshold.len(), self.value.len()]
            .iter()
            .any(|&len| len != nodes)
        {
            return Err("tree arrays differ in length".to_string());
        }
        if nodes == 0 {
            return Err("empty tree".to_string());
        }
        for node in 0..nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left >= 0 {
                if left as usize >= nodes || right < 0 || right as usize >= nodes {
                    return Err(format!("node {} points outside the tree", node));
                }
                // Nodes are stored in pre-order, so children always follow their parent.
                if left as usize <= node || right as usize <= node {
                    return Err(format!("node {} points back to an earlier node", node));
                }
                if self.feature[node] < 0 || self.feature[node] as usize >= n_features {
                    return Err(format!("feature {} out of range", self.feature[node]));
                }
            }
        }
        Ok(())
    }
}

impl Classifier {
    /// Returns `(label, probability of phishing)`.
    fn predict(&self, row: &SparseVector, n_features: usize) -> (u8, Option<f64>) {
        match self {
            Classifier::LogisticRegression { coef, intercept } => {
                let decision = dot(coef, row) + intercept;
                (u8::from(decision > 0.0), Some(sigmoid(decision)))
            }
            Classifier::LinearSvc { coef, intercept } => {
                let decision = dot(coef, row) + intercept;
                (u8::from(decision > 0.0), None)
            }
            Classifier::RandomForest { trees } => {
                let mut dense = vec![0.0; n_features];
                for (idx, v) in row {
                    dense[*idx] = *v;
                }
                let mut proba = [0.0, 0.0];
                for tree in trees {
                    let [a, b] = tree.leaf_distribution(&dense);
                    proba[0] += a;
                    proba[1] += b;
                }
                let n = trees.len().max(1) as f64;
                let phishing = proba[1] / n;
                (u8::from(proba[1] > proba[0]), Some(phishing))
            }
        }
    }

    fn check(&self, n_features: usize, path: &str) -> Result<(), ScorerError> {
        let invalid = |reason: String| ScorerError::InvalidArtifact {
            path: path.to_string(),
            reason,
        };
        match self {
            Classifier::LogisticRegression { coef, .. } | Classifier::LinearSvc { coef, .. } => {
                if coef.len() != n_features {
                    return Err(ScorerError::ShapeMismatch {
                        path: path.to_string(),
                        expected: coef.len(),
                        found: n_features,
                    });
                }
            }
            Classifier::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(invalid("random forest has no trees".to_string()));
                }
                for tree in trees {
                    tree.check(n_features).map_err(invalid)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedModel {
    vectorizer: TfidfVectorizer,
    classifier: Classifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhishingVerdict {
    Phishing,
    NotPhishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreOutcome {
    pub label: u8,
    pub probability: Option<f64>,
}

impl ScoreOutcome {
    pub fn verdict(&self) -> PhishingVerdict {
        if self.label == 1 {
            PhishingVerdict::Phishing
        } else {
            PhishingVerdict::NotPhishing
        }
    }

    /// Probability used for threshold decisions; a classifier without
    /// probabilities counts as certain about its label.
    pub fn effective_probability(&self) -> f64 {
        self.probability.unwrap_or(f64::from(self.label))
    }
}

/// Loaded once at startup. A missing or broken artifact does not stop the
/// service; every score request then reports the load error.
#[derive(Debug, Clone)]
pub struct PhishingScorer {
    model: Result<LoadedModel, ScorerError>,
}

impl PhishingScorer {
    pub fn load(model_path: &Path) -> Self {
        let display = absolute_display(model_path);
        let model = match fs::read_to_string(model_path) {
            Ok(json) => Self::build(&json, &display),
            Err(e) => {
                warn!("Phishing model not available at {}: {}", display, e);
                Err(ScorerError::ModelMissing { path: display })
            }
        };
        if model.is_ok() {
            info!("Loaded phishing model from {}", model_path.display());
        }
        PhishingScorer { model }
    }

    pub fn from_json(json: &str, model_path: &str) -> Self {
        PhishingScorer {
            model: Self::build(json, model_path),
        }
    }

    fn build(json: &str, path: &str) -> Result<LoadedModel, ScorerError> {
        let artifact: ModelArtifact = serde_json::from_str(json).map_err(|e| ScorerError::InvalidArtifact {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let vectorizer = TfidfVectorizer::new(artifact.vectorizer).map_err(|reason| ScorerError::InvalidArtifact {
            path: path.to_string(),
            reason,
        })?;
        let n_features = vectorizer.n_features();
        if let Some(max_index) = vectorizer.max_vocabulary_index() {
            if max_index >= n_features {
                return Err(ScorerError::ShapeMismatch {
                    path: path.to_string(),
                    expected: max_index + 1,
                    found: n_features,
                });
            }
        }
        artifact.classifier.check(n_features, path)?;
        Ok(LoadedModel {
            vectorizer,
            classifier: artifact.classifier,
        })
    }

    /// Fails with the load error when the artifact is unusable.
    pub fn ensure_loaded(&self) -> Result<(), ScorerError> {
        self.model.as_ref().map(|_| ()).map_err(Clone::clone)
    }

    /// Scores `subject + ' ' + body_text + ' ' + body_html` as one text blob.
    pub fn score(&self, subject: &str, body_text: &str, body_html: &str) -> Result<ScoreOutcome, ScorerError> {
        let model = self.model.as_ref().map_err(Clone::clone)?;
        let text = format!("{} {} {}", subject, body_text, body_html);
        let row = model.vectorizer.transform(&text);
        let (label, probability) = model.classifier.predict(&row, model.vectorizer.n_features());
        Ok(ScoreOutcome { label, probability })
    }
}

fn absolute_display(path: &Path) -> String {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.display().to_string()
}
