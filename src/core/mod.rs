pub mod config;

// Feature extraction and comparison
pub mod joint_vectors;
pub mod aggregator;
pub mod motion_comparator;

// Form classification
pub mod random_forest;
pub mod form_classifier;
pub mod model_store;

// Video processing
pub mod video_pipeline;
