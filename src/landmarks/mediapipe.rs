use super::hand_landmark::{HandLandmarkModel, RawHand};
use super::palm::PalmDetector;
use super::roi::Roi;
use super::types::{HandDetector, HandPose};
use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// Palm ROIs closer than this to a tracked hand are the same hand
const SAME_HAND_OVERLAP: f32 = 0.5;

/// First stage: find hand regions in a whole frame
pub trait PalmStage {
    fn palms(&mut self, frame: &RgbImage, min_score: f32, max_palms: usize) -> Result<Vec<Roi>>;
}

/// Second stage: read joints inside one hand region
pub trait LandmarkStage {
    fn landmarks(&mut self, frame: &RgbImage, roi: &Roi) -> Result<RawHand>;
}

impl PalmStage for PalmDetector {
    fn palms(&mut self, frame: &RgbImage, min_score: f32, max_palms: usize) -> Result<Vec<Roi>> {
        self.detect(frame, min_score, max_palms)
    }
}

impl LandmarkStage for HandLandmarkModel {
    fn landmarks(&mut self, frame: &RgbImage, roi: &Roi) -> Result<RawHand> {
        self.infer(frame, roi)
    }
}

/// Confidence thresholds and hand limit, fixed at startup
#[derive(Clone, Copy, Debug)]
pub struct HandsConfig {
    /// Minimum palm detector score to start tracking a hand
    pub min_detection_confidence: f32,
    /// Minimum hand presence score to keep a hand
    pub min_tracking_confidence: f32,
    pub max_num_hands: usize,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
            max_num_hands: 2,
        }
    }
}

/// Two-stage hand tracker
///
/// Hands found in one frame are followed into the next through a ROI derived
/// from their landmarks. The palm detector only runs while fewer than
/// `max_num_hands` hands are being tracked.
pub struct MediaPipeHands<P = PalmDetector, L = HandLandmarkModel> {
    palm: P,
    landmark: L,
    config: HandsConfig,
    tracked: Vec<Roi>,
}

impl MediaPipeHands {
    pub fn load<P: AsRef<Path>>(palm_model: P, landmark_model: P, config: HandsConfig) -> Result<Self> {
        tracing::info!("Loading palm detector from {}", palm_model.as_ref().display());
        let palm = PalmDetector::new(palm_model)?;
        tracing::info!("Loading hand landmark model from {}", landmark_model.as_ref().display());
        let landmark = HandLandmarkModel::new(landmark_model)?;
        Ok(Self::with_stages(palm, landmark, config))
    }
}

impl<P: PalmStage, L: LandmarkStage> MediaPipeHands<P, L> {
    pub fn with_stages(palm: P, landmark: L, config: HandsConfig) -> Self {
        Self {
            palm,
            landmark,
            config,
            tracked: Vec::new(),
        }
    }
}

impl<P: PalmStage, L: LandmarkStage> HandDetector for MediaPipeHands<P, L> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<HandPose>> {
        let _span = tracing::debug_span!("detect_hands").entered();
        let (width, height) = frame.dimensions();
        let max_hands = self.config.max_num_hands;

        let mut rois = std::mem::take(&mut self.tracked);
        if rois.len() < max_hands {
            let palms = self
                .palm
                .palms(frame, self.config.min_detection_confidence, max_hands)?;
            for palm in palms {
                if rois.len() >= max_hands {
                    break;
                }
                if rois.iter().all(|r| r.overlap(&palm) < SAME_HAND_OVERLAP) {
                    rois.push(palm);
                }
            }
        }

        let mut hands = Vec::with_capacity(rois.len());
        for roi in &rois {
            let raw = self.landmark.landmarks(frame, roi)?;
            let pose = raw.to_pose(roi, width, height)?;
            if pose.score < self.config.min_tracking_confidence {
                tracing::debug!("Lost hand (presence {:.2})", pose.score);
                continue;
            }
            self.tracked
                .push(Roi::from_landmarks(&pose.landmarks, width, height));
            hands.push(pose);
        }

        Ok(hands)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting tracked hands");
        self.tracked.clear();
    }
}
