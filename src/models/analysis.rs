// Data structures for analysis requests crossing the service boundary

use crate::core::form_classifier::{ClassifierError, Prediction, TrainingReport};
use crate::core::model_store::StoreError;
use crate::models::features::{FeatureError, Label};
use crate::models::pose::PoseError;
use crate::platform::video::VideoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

// ==============================================================================
// Responses
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

/// Stable error kinds reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoValidFrames,
    DimensionMismatch,
    ModelNotTrained,
    EmptyTrainingSet,
    InvalidInput,
    VideoError,
    PoseError,
    PersistenceError,
    InvalidConfig,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result payload of a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Feedback {
        divergence: f64,
        frames_compared: usize,
        needs_correction: bool,
        feedback_text: String,
    },
    Classification {
        model_id: Uuid,
        class_probabilities: BTreeMap<Label, f64>,
        target_label: Label,
        target_probability: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        caveat: Option<String>,
    },
    Training {
        model_id: Uuid,
        report: TrainingReport,
        #[serde(skip_serializing_if = "Option::is_none")]
        model_path: Option<PathBuf>,
    },
}

impl From<Prediction> for AnalysisOutcome {
    fn from(prediction: Prediction) -> Self {
        AnalysisOutcome::Classification {
            model_id: prediction.model_id,
            class_probabilities: prediction.probabilities,
            target_label: prediction.target_label,
            target_probability: prediction.target_probability,
            caveat: prediction.caveat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub request_id: Uuid,
    pub status: AnalysisStatus,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl AnalysisResponse {
    pub fn completed(request_id: Uuid, outcome: AnalysisOutcome) -> Self {
        Self {
            request_id,
            status: AnalysisStatus::Completed,
            completed_at: Utc::now(),
            result: Some(outcome),
            error: None,
        }
    }

    pub fn failed(request_id: Uuid, error: &AnalysisError) -> Self {
        Self {
            request_id,
            status: AnalysisStatus::Failed,
            completed_at: Utc::now(),
            result: None,
            error: Some(ErrorBody {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    pub fn from_result(request_id: Uuid, result: AnalysisResult<AnalysisOutcome>) -> Self {
        match result {
            Ok(outcome) => Self::completed(request_id, outcome),
            Err(e) => Self::failed(request_id, &e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("Pose estimation failed: {0}")]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Feature(FeatureError::NoValidFrames) => ErrorKind::NoValidFrames,
            AnalysisError::Feature(FeatureError::DimensionMismatch { .. })
            | AnalysisError::Classifier(ClassifierError::DimensionMismatch { .. }) => {
                ErrorKind::DimensionMismatch
            }
            AnalysisError::Classifier(ClassifierError::ModelNotTrained) => {
                ErrorKind::ModelNotTrained
            }
            AnalysisError::Classifier(ClassifierError::EmptyTrainingSet { .. }) => {
                ErrorKind::EmptyTrainingSet
            }
            AnalysisError::Classifier(ClassifierError::InvalidInput(_)) => ErrorKind::InvalidInput,
            AnalysisError::Classifier(ClassifierError::Backend(_)) => ErrorKind::Internal,
            AnalysisError::Pose(_) => ErrorKind::PoseError,
            AnalysisError::Video(_) => ErrorKind::VideoError,
            AnalysisError::Store(_) => ErrorKind::PersistenceError,
            AnalysisError::InvalidInput(_) => ErrorKind::InvalidInput,
            AnalysisError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
