// Random forest - label-aware wrapper around aprender's bagged CART ensemble

use crate::core::form_classifier::{ClassifierError, ClassifierResult, ProbabilisticClassifier};
use crate::models::features::Label;
use aprender::primitives::Matrix;
use aprender::tree::RandomForestClassifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ensemble of decision trees fit on bootstrap samples.
///
/// aprender works on dense class indices and `f32` rows; this type keeps the
/// mapping back to the caller's labels and the row width seen during fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    random_state: u64,
    classes: Vec<Label>,
    n_features: Option<usize>,
    forest: Option<RandomForestClassifier>,
}

impl RandomForest {
    /// Creates an unfitted forest with `n_estimators` trees
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            random_state: 42,
            classes: Vec::new(),
            n_features: None,
            forest: None,
        }
    }

    /// Sets the maximum depth for each tree (root has depth 0)
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the random state for reproducibility
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    fn unfitted(&self) -> RandomForestClassifier {
        let forest =
            RandomForestClassifier::new(self.n_estimators).with_random_state(self.random_state);
        match self.max_depth {
            Some(depth) => forest.with_max_depth(depth),
            None => forest,
        }
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[Label]) -> ClassifierResult<()> {
        if x.len() != y.len() {
            return Err(ClassifierError::InvalidInput(format!(
                "Number of samples in X ({}) and y ({}) must match",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(ClassifierError::InvalidInput(
                "Cannot fit with zero samples".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(ClassifierError::InvalidInput(
                "Forest needs at least one tree".to_string(),
            ));
        }

        let n_features = x[0].len();
        for row in x {
            if row.len() != n_features {
                return Err(ClassifierError::DimensionMismatch {
                    expected: n_features,
                    found: row.len(),
                });
            }
        }

        let classes: Vec<Label> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let encoded: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();

        let matrix = to_matrix(x.len(), n_features, x.iter().flatten())?;
        let mut forest = self.unfitted();
        forest
            .fit(&matrix, &encoded)
            .map_err(|e| ClassifierError::Backend(e.to_string()))?;

        self.classes = classes;
        self.n_features = Some(n_features);
        self.forest = Some(forest);
        Ok(())
    }

    fn predict_proba(&self, x: &[f64]) -> ClassifierResult<Vec<f64>> {
        let (forest, expected) = match (&self.forest, self.n_features) {
            (Some(forest), Some(expected)) => (forest, expected),
            _ => return Err(ClassifierError::ModelNotTrained),
        };
        if x.len() != expected {
            return Err(ClassifierError::DimensionMismatch {
                expected,
                found: x.len(),
            });
        }

        let proba = forest.predict_proba(&to_matrix(1, expected, x)?);
        let n_trees = self.n_estimators as f64;

        // Vote shares arrive as f32; snap them back to exact vote fractions
        Ok((0..self.classes.len())
            .map(|class| {
                if class < proba.n_cols() {
                    (f64::from(proba.get(0, class)) * n_trees).round() / n_trees
                } else {
                    0.0
                }
            })
            .collect())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

fn to_matrix<'a>(
    rows: usize,
    cols: usize,
    values: impl IntoIterator<Item = &'a f64>,
) -> ClassifierResult<Matrix<f32>> {
    let data: Vec<f32> = values.into_iter().map(|&v| v as f32).collect();
    Matrix::from_vec(rows, cols, data).map_err(|e| ClassifierError::Backend(e.to_string()))
}
