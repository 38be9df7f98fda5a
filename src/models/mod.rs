// Data models for pose landmarks, decoded frames, features and analysis responses

pub mod analysis;
pub mod capture;
pub mod features;
pub mod pose;
