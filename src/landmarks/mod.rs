mod hand_landmark;
mod mediapipe;
mod palm;
mod preprocess;
mod roi;
pub mod types;

pub use mediapipe::{HandsConfig, MediaPipeHands};
pub use types::{index, HandDetector, HandPose, Landmark, HAND_CONNECTIONS, NUM_LANDMARKS};

use anyhow::{Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// Create the default hand detector (MediaPipe palm + landmark models)
pub fn create_default_detector(
    palm_model: &str,
    landmark_model: &str,
    config: HandsConfig,
) -> Result<Box<dyn HandDetector>> {
    let detector = MediaPipeHands::load(palm_model, landmark_model, config)?;
    Ok(Box::new(detector))
}

/// Open an ONNX Runtime session for one of the hand models
fn load_session(path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;

    tracing::debug!(
        "Loaded {} ({} inputs, {} outputs)",
        path.display(),
        session.inputs.len(),
        session.outputs.len()
    );
    Ok(session)
}
