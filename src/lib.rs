pub mod cli;
pub mod core;
pub mod models;
pub mod platform;

use crate::core::aggregator::aggregate_keypoints;
use crate::core::config::Config;
use crate::core::form_classifier::{self, ClassifierError, FormClassifier, TrainedModel};
use crate::core::model_store::{self, ModelStore};
use crate::core::motion_comparator::{compare, segment_sequence};
use crate::core::video_pipeline::{process_video, PipelineOutput};
use crate::models::analysis::{AnalysisError, AnalysisOutcome, AnalysisResponse, AnalysisResult};
use crate::models::features::{FeatureError, Label, LabeledSet, VideoFeatureVector};
use crate::platform::pose::PoseEstimator;
use crate::platform::video::png_sink::stamp_score;
use crate::platform::video::{PngSequenceSink, VideoReference};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Name the most recently trained model is stored under
pub const DEFAULT_MODEL_NAME: &str = "form_classifier";

// Application state
pub struct AppState {
    pub config: RwLock<Config>,
    config_path: Option<PathBuf>,
    estimator: Arc<dyn PoseEstimator>,
    classifier: FormClassifier,
}

impl AppState {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        estimator: Arc<dyn PoseEstimator>,
    ) -> Self {
        let classifier = FormClassifier::from_settings(config.classifier.clone());
        Self {
            config: RwLock::new(config),
            config_path,
            estimator,
            classifier,
        }
    }

    /// Load configuration (from `config_path` or the default location) and build the live estimator
    pub fn initialize(config_path: Option<PathBuf>) -> AnalysisResult<Self> {
        let config = match &config_path {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        let estimator = crate::platform::pose::default_estimator(&config.pose)?;
        info!("Pose estimator: {}", estimator.model_info());

        Ok(Self::new(config, config_path, estimator))
    }

    pub fn config_snapshot(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn classifier(&self) -> &FormClassifier {
        &self.classifier
    }

    fn save_config(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.config_path {
            Some(path) => config.save_to(path),
            None => config.save(),
        }
    }
}

// ==============================================================================
// Analysis Commands
// ==============================================================================

/// Compare a user video against a reference video of the same exercise
pub async fn compare_videos(
    state: &AppState,
    user: PathBuf,
    reference: PathBuf,
    annotate_dir: Option<PathBuf>,
) -> AnalysisResponse {
    let request_id = Uuid::new_v4();
    info!("[{}] Comparing {:?} against {:?}", request_id, user, reference);

    let result = run_comparison(state, user, reference, annotate_dir).await;
    AnalysisResponse::from_result(request_id, result)
}

async fn run_comparison(
    state: &AppState,
    user: PathBuf,
    reference: PathBuf,
    annotate_dir: Option<PathBuf>,
) -> AnalysisResult<AnalysisOutcome> {
    let config = state.config_snapshot();
    let stride = config.sampling_stride;

    let estimator = &state.estimator;
    let (user_output, reference_output) = match annotate_dir {
        // Annotated runs go one after the other, each into its own output directory
        Some(dir) => {
            let user_dir = Some(dir.join("user"));
            let reference_dir = Some(dir.join("reference"));
            let user_output =
                process_in_background(user, estimator.clone(), stride, user_dir).await?;
            let reference_output =
                process_in_background(reference, estimator.clone(), stride, reference_dir).await?;
            (user_output, reference_output)
        }
        None => {
            let (user_output, reference_output) = tokio::join!(
                process_in_background(user, estimator.clone(), stride, None),
                process_in_background(reference, estimator.clone(), stride, None),
            );
            (user_output?, reference_output?)
        }
    };

    let user_segments = segment_sequence(&user_output.keypoints, &config.joint_chain);
    let reference_segments = segment_sequence(&reference_output.keypoints, &config.joint_chain);
    if user_segments.is_empty() || reference_segments.is_empty() {
        warn!(
            "Could not analyze: {} user frames, {} reference frames had the joint chain",
            user_segments.len(),
            reference_segments.len()
        );
        return Err(FeatureError::NoValidFrames.into());
    }

    let comparison = compare(&user_segments, &reference_segments, &config.feedback_policy());
    info!(
        "Divergence {:.4} over {} frames",
        comparison.divergence, comparison.frames_compared
    );

    Ok(AnalysisOutcome::Feedback {
        divergence: comparison.divergence,
        frames_compared: comparison.frames_compared,
        needs_correction: comparison.needs_correction,
        feedback_text: comparison.feedback,
    })
}

/// Score one video with the published form classifier.
///
/// With `annotate_dir`, the sampled frames are written there with landmarks
/// and a bar showing the target probability.
pub async fn classify_video(
    state: &AppState,
    video: PathBuf,
    annotate_dir: Option<PathBuf>,
) -> AnalysisResponse {
    let request_id = Uuid::new_v4();
    info!("[{}] Classifying {:?}", request_id, video);

    let result = run_classification(state, video, annotate_dir).await;
    AnalysisResponse::from_result(request_id, result)
}

async fn run_classification(
    state: &AppState,
    video: PathBuf,
    annotate_dir: Option<PathBuf>,
) -> AnalysisResult<AnalysisOutcome> {
    let model = state
        .classifier
        .current()
        .ok_or(ClassifierError::ModelNotTrained)?;

    let config = state.config_snapshot();
    let output = process_in_background(
        video,
        state.estimator.clone(),
        config.sampling_stride,
        annotate_dir.clone(),
    )
    .await?;
    let vector = aggregate_keypoints(&output.keypoints, &config.angle_features)?;
    let prediction = model.predict(&vector)?;

    if let Some(dir) = annotate_dir {
        let score = prediction.target_probability;
        let stamped = tokio::task::spawn_blocking(move || stamp_score(&dir, score))
            .await
            .map_err(|e| AnalysisError::Internal(format!("Annotation task failed: {}", e)))??;
        info!("Stamped score {:.2} on {} frames", score, stamped);
    }

    Ok(prediction.into())
}

/// Train a new classifier from one directory of videos per label, then publish and persist it
pub async fn train_classifier(
    state: &AppState,
    classes: Vec<(Label, PathBuf)>,
    output: Option<PathBuf>,
) -> AnalysisResponse {
    let request_id = Uuid::new_v4();
    info!("[{}] Training form classifier on {} classes", request_id, classes.len());

    let result = run_training(state, classes, output).await;
    AnalysisResponse::from_result(request_id, result)
}

async fn run_training(
    state: &AppState,
    classes: Vec<(Label, PathBuf)>,
    output: Option<PathBuf>,
) -> AnalysisResult<AnalysisOutcome> {
    let config = state.config_snapshot();
    let mut sets = Vec::with_capacity(classes.len());

    for (label, dir) in classes {
        let videos = list_videos(&dir)?;
        let mut vectors = Vec::with_capacity(videos.len());

        for video in videos {
            match extract_video_features(state, video.clone()).await {
                Ok(vector) => vectors.push(vector),
                Err(AnalysisError::Feature(FeatureError::NoValidFrames)) => {
                    warn!("Skipping {:?}: no frame had the required landmarks", video);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Label {}: {} videos from {:?}", label, vectors.len(), dir);
        sets.push(LabeledSet::new(label, vectors));
    }

    let settings = config.classifier.clone();
    let model = tokio::task::spawn_blocking(move || {
        form_classifier::train_model(&settings.forest(), &sets, &settings)
    })
    .await
    .map_err(|e| AnalysisError::Internal(format!("Training task failed: {}", e)))??;

    let model = Arc::new(model);
    state.classifier.publish(model.clone());

    let model_path = match output {
        Some(path) => {
            std::fs::write(&path, model_store::save(model.as_ref())?)
                .map_err(model_store::StoreError::from)?;
            path
        }
        None => {
            let store = ModelStore::new(config.models_dir())?;
            store.save_to_file(DEFAULT_MODEL_NAME, model.as_ref())?
        }
    };

    Ok(AnalysisOutcome::Training {
        model_id: model.model_id,
        report: model.report.clone(),
        model_path: Some(model_path),
    })
}

/// Publish a persisted model; without a path, the default stored model is used.
///
/// Fails with `ModelNotTrained` when no path is given and nothing has been stored yet.
pub fn load_model(state: &AppState, path: Option<&Path>) -> AnalysisResult<Uuid> {
    let model: TrainedModel = match path {
        Some(path) => model_store::load_path(path)?,
        None => {
            let store = open_model_store(state)?;
            if !store.contains(DEFAULT_MODEL_NAME) {
                return Err(ClassifierError::ModelNotTrained.into());
            }
            store.load_from_file(DEFAULT_MODEL_NAME)?
        }
    };

    let model_id = model.model_id;
    state.classifier.publish(Arc::new(model));
    Ok(model_id)
}

/// Stored models and their total size on disk
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoredModels {
    pub models_dir: PathBuf,
    pub names: Vec<String>,
    pub size_bytes: u64,
}

pub fn list_stored_models(state: &AppState) -> AnalysisResult<StoredModels> {
    let store = open_model_store(state)?;
    Ok(StoredModels {
        models_dir: store.models_dir().to_path_buf(),
        names: store.list_models()?,
        size_bytes: store.size_bytes()?,
    })
}

/// Delete every stored model; the published model stays live
pub fn clear_stored_models(state: &AppState) -> AnalysisResult<StoredModels> {
    let store = open_model_store(state)?;
    let removed = StoredModels {
        models_dir: store.models_dir().to_path_buf(),
        names: store.list_models()?,
        size_bytes: store.size_bytes()?,
    };
    store.clear()?;
    info!("Removed {} stored models", removed.names.len());
    Ok(removed)
}

fn open_model_store(state: &AppState) -> AnalysisResult<ModelStore> {
    Ok(ModelStore::new(state.config_snapshot().models_dir())?)
}

/// Video references inside a training directory, sorted by name
fn list_videos(dir: &Path) -> AnalysisResult<Vec<PathBuf>> {
    let unreadable = |e: std::io::Error| {
        AnalysisError::InvalidInput(format!("Cannot read training directory {:?}: {}", dir, e))
    };

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if VideoReference::from_path(&path).is_ok() {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

async fn extract_video_features(
    state: &AppState,
    video: PathBuf,
) -> AnalysisResult<VideoFeatureVector> {
    let config = state.config_snapshot();
    let estimator = state.estimator.clone();
    let output = process_in_background(video, estimator, config.sampling_stride, None).await?;
    Ok(aggregate_keypoints(&output.keypoints, &config.angle_features)?)
}

/// Run a video pipeline on the blocking pool
async fn process_in_background(
    video: PathBuf,
    estimator: Arc<dyn PoseEstimator>,
    stride: u32,
    annotate_dir: Option<PathBuf>,
) -> AnalysisResult<PipelineOutput> {
    tokio::task::spawn_blocking(move || match annotate_dir {
        Some(dir) => {
            let mut sink = PngSequenceSink::create(&dir)?;
            let output = process_video(&video, estimator, stride, Some(&mut sink))?;
            info!("Wrote {} annotated frames to {:?}", sink.frames_written(), sink.dir());
            Ok(output)
        }
        None => process_video(&video, estimator, stride, None),
    })
    .await
    .map_err(|e| AnalysisError::Internal(format!("Pipeline task failed: {}", e)))?
}

// ==============================================================================
// Configuration Commands
// ==============================================================================

pub fn get_config(state: &AppState) -> Config {
    state.config_snapshot()
}

pub fn update_config(config: Config, state: &AppState) -> Result<(), String> {
    // Validate config
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    // Save to disk
    state
        .save_config(&config)
        .map_err(|e| format!("Failed to save config: {}", e))?;

    // Update in-memory config
    let mut current_config = state.config.write().unwrap_or_else(|e| e.into_inner());
    *current_config = config;

    Ok(())
}

pub fn reset_config(state: &AppState) -> Result<Config, String> {
    let default_config = Config::default();
    state
        .save_config(&default_config)
        .map_err(|e| format!("Failed to reset config: {}", e))?;

    let mut current_config = state.config.write().unwrap_or_else(|e| e.into_inner());
    *current_config = default_config.clone();

    Ok(default_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{AnalysisStatus, ErrorKind};
    use crate::models::pose::{BodyLandmark, Landmark};
    use crate::platform::pose::DummyEstimator;
    use crate::platform::video::KeypointTrack;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("proform_service_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_state(dir: &Path) -> AppState {
        let mut config = Config::default();
        config.data_dir = dir.join("data");
        config.sampling_stride = 1;
        config.classifier.n_estimators = 20;
        AppState::new(config, Some(dir.join("settings.json")), Arc::new(DummyEstimator))
    }

    fn arm(shoulder: (f64, f64), elbow: (f64, f64), wrist: (f64, f64)) -> Vec<Landmark> {
        let mut landmarks = vec![Landmark::new(0.5, 0.5); 33];
        landmarks[BodyLandmark::LeftShoulder.index()] = Landmark::new(shoulder.0, shoulder.1);
        landmarks[BodyLandmark::LeftElbow.index()] = Landmark::new(elbow.0, elbow.1);
        landmarks[BodyLandmark::LeftWrist.index()] = Landmark::new(wrist.0, wrist.1);
        landmarks
    }

    fn write_track(path: &Path, frames: Vec<Option<Vec<Landmark>>>) -> PathBuf {
        KeypointTrack::new(frames).save(path).unwrap();
        path.to_path_buf()
    }

    /// Elbow bent to 90 degrees (label 1) or held straight (label 0)
    fn exercise_track(path: &Path, bent: bool, jitter: f64) -> PathBuf {
        let frames = (0..6)
            .map(|i| {
                let wobble = jitter + i as f64 * 0.002;
                let wrist = if bent { (0.5, 0.5 + wobble) } else { (0.7 + wobble, 0.3) };
                Some(arm((0.3, 0.3), (0.5, 0.3), wrist))
            })
            .collect();
        write_track(path, frames)
    }

    #[tokio::test]
    async fn test_self_comparison_is_affirmative() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let video = exercise_track(&dir.join("curl.json"), true, 0.0);

        let response = compare_videos(&state, video.clone(), video, None).await;
        assert_eq!(response.status, AnalysisStatus::Completed);
        match response.result.unwrap() {
            AnalysisOutcome::Feedback {
                divergence,
                frames_compared,
                needs_correction,
                feedback_text,
            } => {
                assert_eq!(divergence, 0.0);
                assert_eq!(frames_compared, 6);
                assert!(!needs_correction);
                assert_eq!(feedback_text, state.config_snapshot().affirmative_feedback);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_single_frame_divergence_is_corrective() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let user = write_track(
            &dir.join("user.json"),
            vec![Some(arm((0.2, 0.2), (0.2, 0.2), (0.2, 0.2)))],
        );
        let reference = write_track(
            &dir.join("reference.json"),
            vec![Some(arm((0.0, 0.0), (0.3, 0.4), (0.3, 0.4)))],
        );

        let response = compare_videos(&state, user, reference, None).await;
        match response.result.unwrap() {
            AnalysisOutcome::Feedback { divergence, needs_correction, feedback_text, .. } => {
                assert!((divergence - 0.25).abs() < 1e-9);
                assert!(needs_correction);
                assert!(feedback_text.contains("0.25"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_annotated_comparison_writes_both_sequences() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let video = exercise_track(&dir.join("curl.json"), true, 0.0);
        let out = dir.join("annotated");

        let response = compare_videos(&state, video.clone(), video, Some(out.clone())).await;
        assert!(response.is_success());
        assert!(out.join("user").join("frame_000005.png").exists());
        assert!(out.join("reference").join("frame_000005.png").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_comparison_without_landmarks_is_no_valid_frames() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let user = write_track(&dir.join("user.json"), vec![None, None, None]);
        let reference = exercise_track(&dir.join("reference.json"), true, 0.0);

        let response = compare_videos(&state, user.clone(), reference.clone(), None).await;
        assert!(!response.is_success());
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().kind, ErrorKind::NoValidFrames);

        // Either side without usable frames fails the same way
        let response = compare_videos(&state, reference, user, None).await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::NoValidFrames);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_classify_without_model() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let video = exercise_track(&dir.join("curl.json"), true, 0.0);

        let response = classify_video(&state, video, None).await;
        assert_eq!(response.status, AnalysisStatus::Failed);
        assert_eq!(response.error.unwrap().kind, ErrorKind::ModelNotTrained);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_video_without_landmarks_is_no_valid_frames() {
        let dir = temp_dir();
        let state = test_state(&dir);
        let video = write_track(
            &dir.join("empty.json"),
            vec![None, Some(Vec::new()), Some(vec![Landmark::new(0.1, 0.1); 12])],
        );

        let result = extract_video_features(&state, video).await;
        assert!(matches!(result, Err(AnalysisError::Feature(FeatureError::NoValidFrames))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_train_predict_and_reload() {
        let dir = temp_dir();
        let state = test_state(&dir);

        let good_dir = dir.join("good");
        let bad_dir = dir.join("bad");
        std::fs::create_dir_all(&good_dir).unwrap();
        std::fs::create_dir_all(&bad_dir).unwrap();
        for i in 0..6 {
            exercise_track(&good_dir.join(format!("{}.json", i)), true, i as f64 * 0.01);
            exercise_track(&bad_dir.join(format!("{}.json", i)), false, i as f64 * 0.01);
        }
        // Skipped, not fatal
        write_track(&bad_dir.join("nobody.json"), vec![None, None]);

        let response = train_classifier(&state, vec![(1, good_dir), (0, bad_dir)], None).await;
        assert!(response.is_success(), "{:?}", response.error);
        let model_id = match response.result.unwrap() {
            AnalysisOutcome::Training { model_id, report, model_path } => {
                assert_eq!(report.n_train + report.n_test, 12);
                assert!(model_path.unwrap().exists());
                model_id
            }
            other => panic!("unexpected outcome {:?}", other),
        };

        let candidate = exercise_track(&dir.join("candidate.json"), true, 0.03);
        let response = classify_video(&state, candidate.clone(), None).await;
        let first_score = match response.result.unwrap() {
            AnalysisOutcome::Classification { model_id: used, target_probability, .. } => {
                assert_eq!(used, model_id);
                assert!(target_probability > 0.5);
                target_probability
            }
            other => panic!("unexpected outcome {:?}", other),
        };

        let annotated = dir.join("annotated");
        let response = classify_video(&state, candidate.clone(), Some(annotated.clone())).await;
        assert!(response.is_success(), "{:?}", response.error);
        assert!(annotated.join("frame_000005.png").exists());
        let frame = image::open(annotated.join("frame_000000.png")).unwrap().to_rgba8();
        assert_ne!(*frame.get_pixel(0, 0), image::Rgba([0, 0, 0, 255]));

        // A fresh service picks up the stored model
        let restored = test_state(&dir);
        assert_eq!(load_model(&restored, None).unwrap(), model_id);
        match classify_video(&restored, candidate, None).await.result.unwrap() {
            AnalysisOutcome::Classification { target_probability, .. } => {
                assert_eq!(target_probability, first_score);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stored_models_list_and_clear() {
        let dir = temp_dir();
        let state = test_state(&dir);
        assert!(matches!(
            load_model(&state, None),
            Err(AnalysisError::Classifier(ClassifierError::ModelNotTrained))
        ));

        let good_dir = dir.join("good");
        let bad_dir = dir.join("bad");
        std::fs::create_dir_all(&good_dir).unwrap();
        std::fs::create_dir_all(&bad_dir).unwrap();
        for i in 0..3 {
            exercise_track(&good_dir.join(format!("{}.json", i)), true, i as f64 * 0.01);
            exercise_track(&bad_dir.join(format!("{}.json", i)), false, i as f64 * 0.01);
        }
        let response = train_classifier(&state, vec![(1, good_dir), (0, bad_dir)], None).await;
        assert!(response.is_success(), "{:?}", response.error);

        let stored = list_stored_models(&state).unwrap();
        assert_eq!(stored.names, vec![DEFAULT_MODEL_NAME.to_string()]);
        assert!(stored.size_bytes > 0);

        let removed = clear_stored_models(&state).unwrap();
        assert_eq!(removed.names, stored.names);
        assert!(list_stored_models(&state).unwrap().names.is_empty());
        // The published model keeps serving
        assert!(state.classifier().current().is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_training_with_empty_class() {
        let dir = temp_dir();
        let state = test_state(&dir);

        let good_dir = dir.join("good");
        let bad_dir = dir.join("bad");
        std::fs::create_dir_all(&good_dir).unwrap();
        std::fs::create_dir_all(&bad_dir).unwrap();
        exercise_track(&good_dir.join("0.json"), true, 0.0);
        write_track(&bad_dir.join("nobody.json"), vec![None]);

        let response = train_classifier(&state, vec![(1, good_dir), (0, bad_dir)], None).await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::EmptyTrainingSet);
        assert!(state.classifier().current().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_update_and_reset() {
        let dir = temp_dir();
        let state = test_state(&dir);

        let mut config = get_config(&state);
        config.divergence_threshold = 0.3;
        update_config(config, &state).unwrap();
        assert_eq!(get_config(&state).divergence_threshold, 0.3);
        assert!(dir.join("settings.json").exists());

        let mut invalid = get_config(&state);
        invalid.sampling_stride = 0;
        assert!(update_config(invalid, &state).is_err());
        assert_eq!(get_config(&state).divergence_threshold, 0.3);

        let reset = reset_config(&state).unwrap();
        assert_eq!(reset, Config::default());
        assert_eq!(get_config(&state), Config::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
