// Integrations with external pose estimators and video decoding

pub mod pose;
pub mod video;
