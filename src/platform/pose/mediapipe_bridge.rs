// MediaPipe integration bridge
// Runs MediaPipe Pose through PyO3 when the `ml-pyo3` feature is enabled

use super::PoseEstimator;
use crate::models::capture::VideoFrame;
use crate::models::pose::{FrameKeypoints, Landmark, PoseConfig, PoseError, PoseResult};
use serde_json::Value;
use tracing::info;

/// Parse the JSON an inference backend returns for one frame.
///
/// `null` is "no person"; otherwise either a bare landmark array or an object
/// with a `landmarks` array (and optional `topology`).
pub fn parse_landmarks(json: &str) -> PoseResult<Option<FrameKeypoints>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PoseError::InvalidLandmarks(format!("Failed to parse JSON: {}", e)))?;

    match value {
        Value::Null => Ok(None),
        Value::Array(_) => {
            let landmarks: Vec<Landmark> = serde_json::from_value(value)
                .map_err(|e| PoseError::InvalidLandmarks(e.to_string()))?;
            Ok(Some(FrameKeypoints::new(landmarks)))
        }
        Value::Object(_) => {
            let keypoints: FrameKeypoints = serde_json::from_value(value)
                .map_err(|e| PoseError::InvalidLandmarks(e.to_string()))?;
            Ok(Some(keypoints))
        }
        other => Err(PoseError::InvalidLandmarks(format!(
            "Expected landmark array or null, got {}",
            other
        ))),
    }
}

// ==============================================================================
// PyO3 Implementation (Python MediaPipe)
// ==============================================================================

#[cfg(feature = "ml-pyo3")]
pub mod pyo3_backend {
    use super::*;
    use pyo3::prelude::*;
    use pyo3::types::{PyBytes, PyDict, PyModule};

    pub struct MediaPipeEstimator {
        // Python inference module exposing `process_image_bytes`
        inference_module: Py<PyModule>,
        config: PoseConfig,
    }

    fn inference_error(context: &str, e: PyErr) -> PoseError {
        PoseError::InferenceFailed(format!("{}: {}", context, e))
    }

    impl MediaPipeEstimator {
        pub fn new(config: &PoseConfig) -> PoseResult<Self> {
            Python::with_gil(|py| {
                let inference_module = py
                    .import_bound(config.python_module.as_str())
                    .map_err(|e| {
                        PoseError::ModelLoadFailed(format!(
                            "Failed to import {}: {}. \
                             Make sure it is on PYTHONPATH and mediapipe is installed",
                            config.python_module, e
                        ))
                    })?;

                info!(
                    "MediaPipe estimator initialized from module {} (complexity {:?})",
                    config.python_module, config.model_complexity
                );

                Ok(Self {
                    inference_module: inference_module.unbind(),
                    config: config.clone(),
                })
            })
        }
    }

    impl PoseEstimator for MediaPipeEstimator {
        fn estimate(&self, frame: &VideoFrame) -> PoseResult<Option<FrameKeypoints>> {
            if !frame.has_pixels() {
                return Err(PoseError::InferenceFailed(format!(
                    "Frame {} carries no pixel data",
                    frame.index
                )));
            }

            Python::with_gil(|py| {
                let module = self.inference_module.bind(py);

                let process_fn = module
                    .getattr("process_image_bytes")
                    .map_err(|e| inference_error("Failed to get process_image_bytes", e))?;

                let kwargs = PyDict::new_bound(py);
                let set = |key: &str, value: PyObject| {
                    kwargs
                        .set_item(key, value)
                        .map_err(|e| inference_error(&format!("Failed to set {}", key), e))
                };
                set("image_bytes", PyBytes::new_bound(py, &frame.data).into_py(py))?;
                set("width", frame.width.into_py(py))?;
                set("height", frame.height.into_py(py))?;
                set("channels", frame.format.bytes_per_pixel().into_py(py))?;
                set("model_complexity", (self.config.model_complexity as u8).into_py(py))?;
                set("min_detection_confidence", self.config.min_detection_confidence.into_py(py))?;
                set("min_tracking_confidence", self.config.min_tracking_confidence.into_py(py))?;

                let result = process_fn
                    .call((), Some(&kwargs))
                    .map_err(|e| inference_error("MediaPipe inference failed", e))?;

                if result.is_none() {
                    return Ok(None);
                }

                let json_str: String = result
                    .extract()
                    .map_err(|e| inference_error("Failed to extract JSON", e))?;

                parse_landmarks(&json_str)
            })
        }

        fn model_info(&self) -> String {
            format!(
                "PyO3 MediaPipe Pose ({}, complexity {:?})",
                self.config.python_module, self.config.model_complexity
            )
        }
    }
}

// ==============================================================================
// Dummy Implementation (for builds without ML features)
// ==============================================================================

/// Estimator that never detects anyone
pub struct DummyEstimator;

impl DummyEstimator {
    pub fn new(_config: &PoseConfig) -> PoseResult<Self> {
        info!("Using dummy pose estimator (no inference); enable 'ml-pyo3' for MediaPipe");
        Ok(Self)
    }
}

impl PoseEstimator for DummyEstimator {
    fn estimate(&self, _frame: &VideoFrame) -> PoseResult<Option<FrameKeypoints>> {
        Ok(None)
    }

    fn model_info(&self) -> String {
        "Dummy pose estimator (no ML inference - enable 'ml-pyo3' feature)".to_string()
    }
}

// ==============================================================================
// Default Backend Selection
// ==============================================================================

#[cfg(feature = "ml-pyo3")]
pub type DefaultEstimator = pyo3_backend::MediaPipeEstimator;

#[cfg(not(feature = "ml-pyo3"))]
pub type DefaultEstimator = DummyEstimator;
