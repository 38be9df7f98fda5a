// Form classification - training, publishing and serving a probabilistic model
// over aggregated video feature vectors

use crate::core::random_forest::RandomForest;
use crate::models::features::{Label, LabeledSet, VideoFeatureVector};
use aprender::metrics::classification::{accuracy, confusion_matrix};
use aprender::model_selection::train_test_split;
use aprender::primitives::{Matrix, Vector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

// ==============================================================================
// Classifier Capability
// ==============================================================================

/// Any supervised model that can be fit on labeled rows and report class probabilities
pub trait ProbabilisticClassifier: Send + Sync {
    /// Fit on `x` (one row per sample) and integer labels `y`
    fn fit(&mut self, x: &[Vec<f64>], y: &[Label]) -> ClassifierResult<()>;

    /// Probability per class, ordered like [`classes`](Self::classes)
    fn predict_proba(&self, x: &[f64]) -> ClassifierResult<Vec<f64>>;

    /// Classes observed during fitting, ascending
    fn classes(&self) -> &[Label];

    /// Row width seen during fitting; `None` before fitting
    fn n_features(&self) -> Option<usize>;

    /// Most probable class; ties go to the lowest label
    fn predict(&self, x: &[f64]) -> ClassifierResult<Label> {
        let proba = self.predict_proba(x)?;
        let mut best: Option<(usize, f64)> = None;
        for (idx, &p) in proba.iter().enumerate() {
            if best.map_or(true, |(_, top)| p > top) {
                best = Some((idx, p));
            }
        }
        best.and_then(|(idx, _)| self.classes().get(idx).copied())
            .ok_or(ClassifierError::ModelNotTrained)
    }
}

// ==============================================================================
// Training Settings & Diagnostics
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    /// Share of rows held out for diagnostics (default: 0.2)
    pub test_fraction: f64,
    pub random_seed: u64,
    /// Label whose probability mass is reported as the prediction score
    pub target_label: Label,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            test_fraction: 0.2,
            random_seed: 42,
            target_label: 1,
        }
    }
}

impl ClassifierSettings {
    /// Unfitted forest configured from these settings
    pub fn forest(&self) -> RandomForest {
        RandomForest::new(self.n_estimators)
            .with_max_depth(self.max_depth)
            .with_random_state(self.random_seed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: Label,
    pub precision: f64,
    pub recall: f64,
    /// Held-out rows carrying this label
    pub support: usize,
}

/// Held-out diagnostics; informational only, never a pass/fail gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    /// Rows removed because a component was NaN or infinite
    pub dropped_rows: usize,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
}

// ==============================================================================
// Trained Model & Predictions
// ==============================================================================

/// A fitted model plus the metadata needed to serve it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel<C = RandomForest> {
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub n_features: usize,
    pub target_label: Label,
    pub report: TrainingReport,
    pub estimator: C,
}

impl<C: ProbabilisticClassifier> TrainedModel<C> {
    pub fn classes(&self) -> &[Label] {
        self.estimator.classes()
    }

    pub fn predict(&self, vector: &VideoFeatureVector) -> ClassifierResult<Prediction> {
        if vector.dimension() != self.n_features {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.n_features,
                found: vector.dimension(),
            });
        }

        let proba = self.estimator.predict_proba(vector.values())?;
        let classes = self.estimator.classes();
        let probabilities: BTreeMap<Label, f64> =
            classes.iter().copied().zip(proba.iter().copied()).collect();

        let (target_probability, caveat) = match probabilities.get(&self.target_label) {
            Some(&p) if classes.len() > 1 => (p, None),
            _ if classes.len() == 1 => (
                proba[0],
                Some(format!(
                    "Model was trained on a single class (label {}); \
                     the score is that class's probability",
                    classes[0]
                )),
            ),
            _ => (
                0.0,
                Some(format!(
                    "Target label {} was not observed during training",
                    self.target_label
                )),
            ),
        };

        Ok(Prediction {
            model_id: self.model_id,
            probabilities,
            target_label: self.target_label,
            target_probability,
            caveat,
        })
    }
}

/// Probability distribution over classes for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model_id: Uuid,
    pub probabilities: BTreeMap<Label, f64>,
    pub target_label: Label,
    /// Probability mass on the target label
    pub target_probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
}

// ==============================================================================
// Training
// ==============================================================================

/// Fit a fresh copy of `prototype` on labeled sets and report held-out diagnostics.
///
/// Rows with a non-finite component are dropped individually. A class left with
/// no rows fails the whole training run.
pub fn train_model<C>(
    prototype: &C,
    sets: &[LabeledSet],
    settings: &ClassifierSettings,
) -> ClassifierResult<TrainedModel<C>>
where
    C: ProbabilisticClassifier + Clone,
{
    if sets.len() < 2 {
        return Err(ClassifierError::InvalidInput(format!(
            "Training needs at least two labeled sets, got {}",
            sets.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for set in sets {
        if !seen.insert(set.label) {
            return Err(ClassifierError::InvalidInput(format!(
                "Label {} appears in more than one set",
                set.label
            )));
        }
    }
    if !(settings.test_fraction > 0.0 && settings.test_fraction < 1.0) {
        return Err(ClassifierError::InvalidInput(format!(
            "Test fraction must be in (0, 1), got {}",
            settings.test_fraction
        )));
    }

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels: Vec<Label> = Vec::new();
    let mut dropped_rows = 0;

    for set in sets {
        let before = rows.len();
        for vector in &set.vectors {
            if vector.is_finite() {
                rows.push(vector.values().to_vec());
                labels.push(set.label);
            } else {
                dropped_rows += 1;
            }
        }
        if rows.len() == before {
            return Err(ClassifierError::EmptyTrainingSet { label: set.label });
        }
    }
    if dropped_rows > 0 {
        warn!("Dropped {} feature vectors with non-finite values", dropped_rows);
    }

    let n_features = rows[0].len();
    if let Some(row) = rows.iter().find(|row| row.len() != n_features) {
        return Err(ClassifierError::DimensionMismatch {
            expected: n_features,
            found: row.len(),
        });
    }

    let split = split_indices(rows.len(), settings.test_fraction, settings.random_seed);
    let (train_idx, test_idx) = match split {
        Some(split) => split,
        None => {
            warn!(
                "Too few rows to hold out {:.0}%; training on all {} rows without diagnostics",
                settings.test_fraction * 100.0,
                rows.len()
            );
            ((0..rows.len()).collect(), Vec::new())
        }
    };
    let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
    let train_y: Vec<Label> = train_idx.iter().map(|&i| labels[i]).collect();

    let mut estimator = prototype.clone();
    estimator.fit(&train_x, &train_y)?;

    let all_labels: Vec<Label> = seen.into_iter().collect();
    let report = evaluate(
        &estimator,
        &rows,
        &labels,
        &test_idx,
        &all_labels,
        train_idx.len(),
        dropped_rows,
    )?;

    info!(
        "Trained form classifier on {} rows ({} held out): accuracy {:.3}",
        report.n_train, report.n_test, report.accuracy
    );
    for metrics in &report.per_class {
        info!(
            "  label {}: precision {:.3}, recall {:.3}, support {}",
            metrics.label, metrics.precision, metrics.recall, metrics.support
        );
    }

    Ok(TrainedModel {
        model_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        n_features,
        target_label: settings.target_label,
        report,
        estimator,
    })
}

/// Seeded split of row indices into `(train, test)` partitions.
///
/// The held-out count is `round(n * test_fraction)`. Returns `None` when that
/// leaves either partition empty.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> Option<(Vec<usize>, Vec<usize>)> {
    // Split the row ids themselves so the partitions come back as indices
    let ids: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let x = Matrix::from_vec(n, 1, ids.clone()).ok()?;
    let y = Vector::from_vec(ids);

    let (_, _, train, test) = train_test_split(&x, &y, test_fraction as f32, Some(seed)).ok()?;
    let to_indices =
        |ids: &Vector<f32>| -> Vec<usize> { ids.as_slice().iter().map(|&i| i as usize).collect() };
    Some((to_indices(&train), to_indices(&test)))
}

fn evaluate<C: ProbabilisticClassifier>(
    estimator: &C,
    rows: &[Vec<f64>],
    labels: &[Label],
    test_idx: &[usize],
    all_labels: &[Label],
    n_train: usize,
    dropped_rows: usize,
) -> ClassifierResult<TrainingReport> {
    let position = |label: Label| all_labels.binary_search(&label).unwrap_or(all_labels.len());

    let mut y_true = Vec::with_capacity(test_idx.len());
    let mut y_pred = Vec::with_capacity(test_idx.len());
    for &i in test_idx {
        y_true.push(position(labels[i]));
        y_pred.push(position(estimator.predict(&rows[i])?));
    }

    if y_true.is_empty() {
        let per_class = all_labels
            .iter()
            .map(|&label| ClassMetrics {
                label,
                precision: 0.0,
                recall: 0.0,
                support: 0,
            })
            .collect();
        return Ok(TrainingReport {
            n_train,
            n_test: 0,
            dropped_rows,
            accuracy: 0.0,
            per_class,
        });
    }

    // Rows are true classes, columns predicted classes
    let confusion = confusion_matrix(&y_pred, &y_true);
    let count = |truth: usize, predicted: usize| {
        if truth < confusion.n_rows() && predicted < confusion.n_cols() {
            confusion.get(truth, predicted)
        } else {
            0
        }
    };
    let n = confusion.n_rows();

    let per_class = all_labels
        .iter()
        .enumerate()
        .map(|(class, &label)| {
            let true_positive = count(class, class);
            let predicted: usize = (0..n).map(|truth| count(truth, class)).sum();
            let support: usize = (0..n).map(|guess| count(class, guess)).sum();
            ClassMetrics {
                label,
                precision: ratio(true_positive, predicted),
                recall: ratio(true_positive, support),
                support,
            }
        })
        .collect();

    Ok(TrainingReport {
        n_train,
        n_test: test_idx.len(),
        dropped_rows,
        accuracy: f64::from(accuracy(&y_pred, &y_true)),
        per_class,
    })
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

// ==============================================================================
// Form Classifier (published model)
// ==============================================================================

/// Serves the most recently published model to concurrent callers.
///
/// Training builds a complete new model before swapping the shared pointer, so a
/// reader holds either the old model or the new one, never a mix.
pub struct FormClassifier<C = RandomForest> {
    prototype: C,
    settings: ClassifierSettings,
    published: RwLock<Option<Arc<TrainedModel<C>>>>,
}

impl FormClassifier<RandomForest> {
    /// Random forest classifier configured from `settings`
    pub fn from_settings(settings: ClassifierSettings) -> Self {
        Self::new(settings.forest(), settings)
    }
}

impl<C> FormClassifier<C>
where
    C: ProbabilisticClassifier + Clone,
{
    pub fn new(prototype: C, settings: ClassifierSettings) -> Self {
        Self {
            prototype,
            settings,
            published: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Train on `sets` and publish the result; the previous model stays live on failure
    pub fn train(&self, sets: &[LabeledSet]) -> ClassifierResult<Arc<TrainedModel<C>>> {
        let model = Arc::new(train_model(&self.prototype, sets, &self.settings)?);
        self.publish(model.clone());
        Ok(model)
    }

    /// Replace the served model
    pub fn publish(&self, model: Arc<TrainedModel<C>>) {
        info!("Publishing form classifier model {}", model.model_id);
        let mut slot = self.published.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(model);
    }

    pub fn current(&self) -> Option<Arc<TrainedModel<C>>> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn predict(&self, vector: &VideoFeatureVector) -> ClassifierResult<Prediction> {
        let model = self.current().ok_or(ClassifierError::ModelNotTrained)?;
        model.predict(vector)
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("No valid training rows for label {label}")]
    EmptyTrainingSet { label: Label },

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("Dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    #[error("Classifier backend failed: {0}")]
    Backend(String),
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;
