use anyhow::Result;
use image::RgbImage;
use thiserror::Error;

/// Number of joints in a MediaPipe hand pose
pub const NUM_LANDMARKS: usize = 21;

/// Hand landmark indices (MediaPipe hand topology)
#[allow(dead_code)]
pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    /// Thumb, index, middle, ring, pinky
    pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
}

/// Bones drawn for the preview skeleton
pub const HAND_CONNECTIONS: [(usize, usize); 21] = {
    use index::*;
    [
        (WRIST, THUMB_CMC), (THUMB_CMC, THUMB_MCP), (THUMB_MCP, THUMB_IP), (THUMB_IP, THUMB_TIP),
        (WRIST, INDEX_MCP), (INDEX_MCP, INDEX_PIP), (INDEX_PIP, INDEX_DIP), (INDEX_DIP, INDEX_TIP),
        (INDEX_MCP, MIDDLE_MCP), (MIDDLE_MCP, MIDDLE_PIP), (MIDDLE_PIP, MIDDLE_DIP), (MIDDLE_DIP, MIDDLE_TIP),
        (MIDDLE_MCP, RING_MCP), (RING_MCP, RING_PIP), (RING_PIP, RING_DIP), (RING_DIP, RING_TIP),
        (RING_MCP, PINKY_MCP), (PINKY_MCP, PINKY_PIP), (PINKY_PIP, PINKY_DIP), (PINKY_DIP, PINKY_TIP),
        (WRIST, PINKY_MCP),
    ]
};

/// A single joint position
///
/// `x` and `y` are normalized to the frame width and height. `z` is depth
/// relative to the wrist, in roughly the same scale as `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoseError {
    #[error("hand pose needs {expected} landmarks, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// A model produced tensors this crate cannot interpret
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model output missing: {0}")]
    MissingOutput(&'static str),
    #[error("unexpected model output: expected {expected}, got {actual}")]
    UnexpectedShape { expected: String, actual: String },
}

/// One detected hand in one frame
#[derive(Clone, Debug, PartialEq)]
pub struct HandPose {
    pub landmarks: [Landmark; NUM_LANDMARKS],
    /// Hand presence confidence reported by the landmark model
    pub score: f32,
    pub handedness: Handedness,
}

impl HandPose {
    pub fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self {
            landmarks,
            score: 1.0,
            handedness: Handedness::Right,
        }
    }

    pub fn from_slice(landmarks: &[Landmark]) -> Result<Self, PoseError> {
        let landmarks: [Landmark; NUM_LANDMARKS] =
            landmarks.try_into().map_err(|_| PoseError::WrongLength {
                expected: NUM_LANDMARKS,
                actual: landmarks.len(),
            })?;
        Ok(Self::new(landmarks))
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    pub fn get(&self, index: usize) -> &Landmark {
        &self.landmarks[index]
    }
}

/// Trait for landmark sources
/// Allows swapping between different hand-tracking backends
pub trait HandDetector {
    /// Detect every hand visible in a frame
    ///
    /// Returns zero or more poses with coordinates normalized to the frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<HandPose>>;

    /// Forget any hands tracked from previous frames
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless detectors
    }
}
