use crate::core::form_classifier::ClassifierSettings;
use crate::core::joint_vectors::{AngleSpec, JointChain};
use crate::core::motion_comparator::{FeedbackPolicy, DIVERGENCE_PLACEHOLDER};
use crate::models::pose::PoseConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Where trained models and annotated output are saved
    pub data_dir: PathBuf,
    /// Keep every Nth decoded frame (1 keeps all)
    pub sampling_stride: u32,
    /// Mean divergence above which corrective feedback is given
    pub divergence_threshold: f64,
    /// Corrective message; `{divergence}` is replaced by the score
    pub corrective_feedback: String,
    pub affirmative_feedback: String,
    /// Landmarks compared frame by frame against the reference
    pub joint_chain: JointChain,
    /// Angles aggregated into the classifier feature vector
    pub angle_features: Vec<AngleSpec>,
    pub classifier: ClassifierSettings,
    pub pose: PoseConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());

        let mut data_dir = PathBuf::from(home);
        data_dir.push(".proform_data");

        let feedback = FeedbackPolicy::default();

        Self {
            data_dir,
            sampling_stride: 2,
            divergence_threshold: feedback.threshold,
            corrective_feedback: feedback.corrective_template,
            affirmative_feedback: feedback.affirmative_message,
            joint_chain: JointChain::left_arm(),
            angle_features: AngleSpec::default_set(),
            classifier: ClassifierSettings::default(),
            pose: PoseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file, creating it with defaults if it doesn't exist
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load configuration from `path`, creating it with defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::get_config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.validate()?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        // Validate sampling stride
        if self.sampling_stride == 0 || self.sampling_stride > 120 {
            return Err(format!(
                "Invalid sampling stride: {}. Must be between 1 and 120",
                self.sampling_stride
            )
            .into());
        }

        // Validate divergence threshold
        if !self.divergence_threshold.is_finite() || self.divergence_threshold < 0.0 {
            return Err(format!(
                "Invalid divergence threshold: {}. Must be a finite value >= 0",
                self.divergence_threshold
            )
            .into());
        }

        if !self.corrective_feedback.contains(DIVERGENCE_PLACEHOLDER) {
            return Err(format!(
                "Corrective feedback must contain the {} placeholder",
                DIVERGENCE_PLACEHOLDER
            )
            .into());
        }

        if self.angle_features.is_empty() {
            return Err("Angle features cannot be empty".into());
        }

        // Validate classifier settings
        if self.classifier.n_estimators == 0 || self.classifier.n_estimators > 10_000 {
            return Err(format!(
                "Invalid estimator count: {}. Must be between 1 and 10000",
                self.classifier.n_estimators
            )
            .into());
        }

        if !(self.classifier.test_fraction > 0.0 && self.classifier.test_fraction < 1.0) {
            return Err(format!(
                "Invalid test fraction: {}. Must be between 0.0 and 1.0 (exclusive)",
                self.classifier.test_fraction
            )
            .into());
        }

        // Validate pose confidences
        if !(0.0..=1.0).contains(&self.pose.min_detection_confidence) {
            return Err(format!(
                "Invalid detection confidence: {}. Must be between 0.0 and 1.0",
                self.pose.min_detection_confidence
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.pose.min_tracking_confidence) {
            return Err(format!(
                "Invalid tracking confidence: {}. Must be between 0.0 and 1.0",
                self.pose.min_tracking_confidence
            )
            .into());
        }

        Ok(())
    }

    /// Threshold and messages used by the motion comparator
    pub fn feedback_policy(&self) -> FeedbackPolicy {
        FeedbackPolicy {
            threshold: self.divergence_threshold,
            corrective_template: self.corrective_feedback.clone(),
            affirmative_message: self.affirmative_feedback.clone(),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// Get the configuration file path
    pub fn get_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| "Could not determine home directory")?;

        let mut path = PathBuf::from(home);
        path.push(".proform_data");
        path.push("config");
        path.push("settings.json");

        Ok(path)
    }
}
