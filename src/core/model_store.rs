// Trained model persistence
// Handles serializing classifier models to versioned blobs and managing the models directory

use crate::core::form_classifier::TrainedModel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Blob format written by this build
pub const FORMAT_VERSION: u32 = 1;

/// File extension for stored models
pub const MODEL_EXTENSION: &str = "model.json";

#[derive(Serialize)]
struct BlobRef<'a, C> {
    format_version: u32,
    model: &'a TrainedModel<C>,
}

#[derive(Deserialize)]
struct BlobHeader {
    format_version: u32,
    model: Value,
}

/// Serialize a trained model into an opaque, versioned blob
pub fn save<C: Serialize>(model: &TrainedModel<C>) -> StoreResult<Vec<u8>> {
    let blob = BlobRef {
        format_version: FORMAT_VERSION,
        model,
    };
    Ok(serde_json::to_vec(&blob)?)
}

/// Restore a trained model from a blob produced by [`save`].
///
/// Tree ensembles nest one JSON level per split, so the blob is parsed without
/// serde_json's recursion limit on a growable stack. Split feature indices and
/// leaf classes are checked against the model's row width and class list
/// before anything is deserialized into live trees.
pub fn load<C: DeserializeOwned>(bytes: &[u8]) -> StoreResult<TrainedModel<C>> {
    let mut json = serde_json::Deserializer::from_slice(bytes);
    json.disable_recursion_limit();
    let header = BlobHeader::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;

    if header.format_version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: header.format_version,
            expected: FORMAT_VERSION,
        });
    }

    check_tree_indices(&header.model)?;
    Ok(TrainedModel::deserialize(serde_stacker::Deserializer::new(
        header.model,
    ))?)
}

/// Walk every object in `model` and validate the fields trees index with
fn check_tree_indices(model: &Value) -> StoreResult<()> {
    let n_features = model
        .get("n_features")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::Inconsistent("missing n_features".to_string()))?;

    let estimator = model.get("estimator");
    if let Some(width) = estimator.and_then(|e| e.get("n_features")).and_then(Value::as_u64) {
        if width != n_features {
            return Err(StoreError::Inconsistent(format!(
                "estimator expects {} features, model declares {}",
                width, n_features
            )));
        }
    }
    let n_classes = estimator
        .and_then(|e| e.get("classes"))
        .and_then(Value::as_array)
        .map(|classes| classes.len() as u64);

    let mut pending = vec![model];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(fields) => {
                if let Some(idx) = fields.get("feature_idx").and_then(Value::as_u64) {
                    if idx >= n_features {
                        return Err(StoreError::Inconsistent(format!(
                            "split on feature {} of a {}-feature model",
                            idx, n_features
                        )));
                    }
                }
                if let (Some(class), Some(n_classes)) =
                    (fields.get("class_label").and_then(Value::as_u64), n_classes)
                {
                    if class >= n_classes {
                        return Err(StoreError::Inconsistent(format!(
                            "leaf predicts class {} of {}",
                            class, n_classes
                        )));
                    }
                }
                pending.extend(fields.values());
            }
            _ => {}
        }
    }
    Ok(())
}

/// Model store for saving and loading trained classifiers on disk
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    /// Create a new model store rooted at `models_dir`
    pub fn new(models_dir: PathBuf) -> StoreResult<Self> {
        fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the local path for a named model
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("{}.{}", name, MODEL_EXTENSION))
    }

    /// Check if a named model is stored
    pub fn contains(&self, name: &str) -> bool {
        self.model_path(name).exists()
    }

    /// Write `model` under `name`, replacing any previous model with that name
    pub fn save_to_file<C: Serialize>(
        &self,
        name: &str,
        model: &TrainedModel<C>,
    ) -> StoreResult<PathBuf> {
        let path = self.model_path(name);
        let bytes = save(model)?;

        // Write then rename so a reader never sees a half-written file
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        info!("Saved model {} to {:?}", model.model_id, path);
        Ok(path)
    }

    /// Load a named model from the store
    pub fn load_from_file<C: DeserializeOwned>(&self, name: &str) -> StoreResult<TrainedModel<C>> {
        load_path(&self.model_path(name))
    }

    /// Names of all stored models, sorted
    pub fn list_models(&self) -> StoreResult<Vec<String>> {
        let suffix = format!(".{}", MODEL_EXTENSION);
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.models_dir)? {
            let entry = entry?;
            if !entry.metadata()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().and_then(|f| f.strip_suffix(&suffix)) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Remove every stored model
    pub fn clear(&self) -> StoreResult<()> {
        if self.models_dir.exists() {
            fs::remove_dir_all(&self.models_dir)?;
            fs::create_dir_all(&self.models_dir)?;
        }
        Ok(())
    }

    /// Get total size of stored models in bytes
    pub fn size_bytes(&self) -> StoreResult<u64> {
        let mut total_size = 0u64;

        if self.models_dir.exists() {
            for entry in fs::read_dir(&self.models_dir)? {
                let metadata = entry?.metadata()?;
                if metadata.is_file() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

/// Load a model blob from an arbitrary path
pub fn load_path<C: DeserializeOwned>(path: &Path) -> StoreResult<TrainedModel<C>> {
    debug!("Loading model from {:?}", path);
    let bytes = fs::read(path)?;
    load(&bytes)
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Model I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model blob is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Model blob is inconsistent: {0}")]
    Inconsistent(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::form_classifier::{train_model, ClassifierSettings};
    use crate::core::random_forest::RandomForest;
    use crate::models::features::{LabeledSet, VideoFeatureVector};
    use aprender::tree::{Leaf, Node, TreeNode};

    fn trained() -> TrainedModel<RandomForest> {
        let good = (0..10)
            .map(|i| VideoFeatureVector::from_values(vec![10.0 + i as f64, 20.0]))
            .collect();
        let bad = (0..10)
            .map(|i| VideoFeatureVector::from_values(vec![80.0 + i as f64, 90.0]))
            .collect();
        let sets = vec![LabeledSet::new(1, good), LabeledSet::new(0, bad)];
        train_model(&RandomForest::new(8), &sets, &ClassifierSettings::default()).unwrap()
    }

    /// Left-leaning chain of `depth` splits ending in a class-0 leaf
    fn deep_tree(depth: usize, feature_idx: usize) -> TreeNode {
        let leaf = |class_label| TreeNode::Leaf(Leaf { class_label, n_samples: 1 });
        let mut node = leaf(0);
        for level in 0..depth {
            node = TreeNode::Node(Node {
                feature_idx,
                threshold: 1000.0 + level as f32,
                left: Box::new(node),
                right: Box::new(leaf(1)),
            });
        }
        node
    }

    /// Blob for `model` with the first tree of its forest replaced by `tree`
    fn blob_with_tree(model: &TrainedModel<RandomForest>, tree: &TreeNode) -> Vec<u8> {
        let mut value = serde_json::to_value(model).unwrap();
        value["estimator"]["forest"]["trees"][0]["tree"] = serde_json::to_value(tree).unwrap();
        serde_json::to_vec(&serde_json::json!({
            "format_version": FORMAT_VERSION,
            "model": value,
        }))
        .unwrap()
    }

    fn temp_store() -> ModelStore {
        let dir = std::env::temp_dir().join(format!("proform_models_{}", uuid::Uuid::new_v4()));
        ModelStore::new(dir).unwrap()
    }

    #[test]
    fn test_loaded_model_predicts_identically() {
        let model = trained();
        let bytes = save(&model).unwrap();
        let restored: TrainedModel<RandomForest> = load(&bytes).unwrap();

        assert_eq!(restored.model_id, model.model_id);
        assert_eq!(restored.report, model.report);

        let sample = VideoFeatureVector::from_values(vec![45.0, 55.0]);
        assert_eq!(
            restored.predict(&sample).unwrap().probabilities,
            model.predict(&sample).unwrap().probabilities
        );
    }

    #[test]
    fn test_deep_trees_load() {
        let model = trained();
        let blob = blob_with_tree(&model, &deep_tree(300, 0));

        let restored: TrainedModel<RandomForest> = load(&blob).unwrap();
        let prediction = restored
            .predict(&VideoFeatureVector::from_values(vec![45.0, 55.0]))
            .unwrap();
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_split_is_rejected() {
        let model = trained();
        let blob = blob_with_tree(&model, &deep_tree(3, 7));

        let result: StoreResult<TrainedModel<RandomForest>> = load(&blob);
        assert!(matches!(result, Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn test_declared_width_must_match_estimator() {
        let mut value = serde_json::to_value(trained()).unwrap();
        value["n_features"] = serde_json::json!(5);
        let blob = serde_json::to_vec(&serde_json::json!({
            "format_version": FORMAT_VERSION,
            "model": value,
        }))
        .unwrap();

        let result: StoreResult<TrainedModel<RandomForest>> = load(&blob);
        assert!(matches!(result, Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let blob = br#"{"format_version": 99, "model": {}}"#;
        let result: StoreResult<TrainedModel<RandomForest>> = load(blob);
        assert!(matches!(
            result,
            Err(StoreError::UnsupportedVersion { found: 99, expected: FORMAT_VERSION })
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result: StoreResult<TrainedModel<RandomForest>> = load(b"not a model");
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_file_store_lifecycle() {
        let store = temp_store();
        let model = trained();

        assert!(!store.contains("squat"));
        store.save_to_file("squat", &model).unwrap();
        store.save_to_file("curl", &model).unwrap();

        assert!(store.contains("squat"));
        assert_eq!(store.list_models().unwrap(), vec!["curl", "squat"]);
        assert!(store.size_bytes().unwrap() > 0);

        let loaded: TrainedModel<RandomForest> = store.load_from_file("squat").unwrap();
        assert_eq!(loaded.model_id, model.model_id);

        store.clear().unwrap();
        assert!(store.list_models().unwrap().is_empty());

        let _ = fs::remove_dir_all(store.models_dir());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let store = temp_store();
        let result: StoreResult<TrainedModel<RandomForest>> = store.load_from_file("absent");
        assert!(matches!(result, Err(StoreError::Io(_))));
        let _ = fs::remove_dir_all(store.models_dir());
    }
}
