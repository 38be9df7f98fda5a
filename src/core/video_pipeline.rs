// Video pipeline - decoded frames through the pose estimator into a landmark sequence

use crate::models::analysis::AnalysisResult;
use crate::models::pose::FrameKeypoints;
use crate::platform::pose::PoseEstimator;
use crate::platform::video::{
    ImageSequenceSource, KeypointTrack, Strided, VideoReference, VideoSink, VideoSource,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Landmarks detected across one video, in presentation order
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// Frames with a detected person; frames without one are skipped
    pub keypoints: Vec<FrameKeypoints>,
    /// Frames kept after sampling
    pub frames_sampled: usize,
    pub frames_without_person: usize,
}

/// Pull every frame from `source`, estimate landmarks, and optionally write annotated frames.
///
/// Every sampled frame is written to the sink, annotated when a person was found.
pub fn run_pipeline(
    source: &mut dyn VideoSource,
    estimator: &dyn PoseEstimator,
    mut sink: Option<&mut dyn VideoSink>,
) -> AnalysisResult<PipelineOutput> {
    let mut output = PipelineOutput::default();

    while let Some(frame) = source.next_frame()? {
        output.frames_sampled += 1;

        let detected = estimator.estimate(&frame)?;
        if let Some(sink) = sink.as_deref_mut() {
            sink.write_frame(&frame, detected.as_ref())?;
        }

        match detected {
            Some(keypoints) => output.keypoints.push(keypoints),
            None => {
                debug!("No person detected in frame {}", frame.index);
                output.frames_without_person += 1;
            }
        }
    }

    if let Some(sink) = sink {
        sink.finish()?;
    }

    Ok(output)
}

/// Open a video reference as a sampled frame source plus the estimator for its frames.
///
/// Keypoint tracks bring their own recorded estimator; image sequences use `live`.
pub fn open_reference(
    reference: &VideoReference,
    live: Arc<dyn PoseEstimator>,
    stride: u32,
) -> AnalysisResult<(Box<dyn VideoSource>, Arc<dyn PoseEstimator>)> {
    match reference {
        VideoReference::Track(path) => {
            let (source, recorded) = KeypointTrack::load(path)?.into_parts();
            Ok((Box::new(Strided::new(source, stride)), Arc::new(recorded)))
        }
        VideoReference::ImageSequence(dir) => {
            let source = ImageSequenceSource::open(dir)?;
            Ok((Box::new(Strided::new(source, stride)), live))
        }
    }
}

/// Resolve `path`, then run it through the pipeline
pub fn process_video(
    path: &Path,
    live: Arc<dyn PoseEstimator>,
    stride: u32,
    sink: Option<&mut dyn VideoSink>,
) -> AnalysisResult<PipelineOutput> {
    let start = Instant::now();
    let reference = VideoReference::from_path(path)?;
    let (mut source, estimator) = open_reference(&reference, live, stride)?;

    let output = run_pipeline(source.as_mut(), estimator.as_ref(), sink)?;
    info!(
        "Processed {:?}: {} sampled frames, {} with a person ({} ms, {})",
        path,
        output.frames_sampled,
        output.keypoints.len(),
        start.elapsed().as_millis(),
        estimator.model_info()
    );
    Ok(output)
}
