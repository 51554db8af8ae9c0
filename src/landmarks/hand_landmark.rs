use super::preprocess::Preprocessor;
use super::roi::Roi;
use super::types::{Handedness, HandPose, Landmark, ModelError, NUM_LANDMARKS};
use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

const INPUT_SIZE: u32 = 224;

/// Raw outputs of one landmark model run, still in crop space
#[derive(Clone, Debug)]
pub struct RawHand {
    /// x, y, z per joint in input pixels
    pub coords: Vec<f32>,
    /// Hand presence logit
    pub presence: f32,
    /// Probability of a right hand
    pub handedness: f32,
}

impl RawHand {
    /// Project crop-space joints back into normalized frame coordinates
    pub fn to_pose(&self, roi: &Roi, frame_width: u32, frame_height: u32) -> Result<HandPose> {
        if self.coords.len() < NUM_LANDMARKS * 3 {
            return Err(ModelError::UnexpectedShape {
                expected: format!("{} landmark values", NUM_LANDMARKS * 3),
                actual: format!("{}", self.coords.len()),
            }
            .into());
        }

        let size = INPUT_SIZE as f32;
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let landmarks: Vec<Landmark> = self
            .coords
            .chunks_exact(3)
            .take(NUM_LANDMARKS)
            .map(|c| {
                let (x, y) = roi.project(c[0] / size, c[1] / size);
                Landmark::new(x / fw, y / fh, c[2] / size * roi.width / fw)
            })
            .collect();

        let handedness = if self.handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };

        Ok(HandPose::from_slice(&landmarks)?
            .with_score(self.presence_score())
            .with_handedness(handedness))
    }

    pub fn presence_score(&self) -> f32 {
        1.0 / (1.0 + (-self.presence).exp())
    }
}

/// MediaPipe hand landmark model (224x224 input)
pub struct HandLandmarkModel {
    session: Session,
    preprocessor: Preprocessor,
}

impl HandLandmarkModel {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = super::load_session(model_path.as_ref())?;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
        })
    }

    /// Run the model on one hand region
    pub fn infer(&mut self, frame: &RgbImage, roi: &Roi) -> Result<RawHand> {
        let _span = tracing::debug_span!("hand_landmarks").entered();

        let input = self.preprocessor.crop(frame, roi);
        let outputs = self
            .session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("Failed to run hand landmark model")?;

        // Screen landmarks come before world landmarks, presence before handedness
        let mut coords = None;
        let mut scalars = Vec::with_capacity(2);
        for i in 0..outputs.len() {
            let values: Vec<f32> = outputs[i].try_extract_array::<f32>()?.iter().copied().collect();
            match values.len() {
                1 => scalars.push(values[0]),
                n if n == NUM_LANDMARKS * 3 && coords.is_none() => coords = Some(values),
                _ => {}
            }
        }

        let coords = coords.ok_or(ModelError::MissingOutput("hand landmarks"))?;
        let &[presence, handedness, ..] = scalars.as_slice() else {
            return Err(ModelError::MissingOutput("hand presence and handedness").into());
        };

        Ok(RawHand {
            coords,
            presence,
            handedness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_hand_projects_through_roi() {
        let mut coords = vec![0.0; NUM_LANDMARKS * 3];
        // Joint 0 at the crop centre, joint 1 at the crop's top-left corner
        coords[0] = 112.0;
        coords[1] = 112.0;
        coords[5] = 22.4;
        let raw = RawHand {
            coords,
            presence: 4.0,
            handedness: 0.2,
        };
        let roi = Roi {
            center_x: 50.0,
            center_y: 100.0,
            width: 40.0,
            height: 40.0,
            rotation: 0.0,
        };

        let pose = raw.to_pose(&roi, 100, 200).unwrap();
        assert!((pose.landmarks[0].x - 0.5).abs() < 1e-5);
        assert!((pose.landmarks[0].y - 0.5).abs() < 1e-5);
        assert!((pose.landmarks[1].x - 0.3).abs() < 1e-5);
        assert!((pose.landmarks[1].y - 0.4).abs() < 1e-5);
        assert!((pose.landmarks[1].z - 0.04).abs() < 1e-5);
        assert_eq!(pose.handedness, Handedness::Left);
        assert!(pose.score > 0.98);
    }

    #[test]
    fn short_output_is_rejected() {
        let raw = RawHand {
            coords: vec![0.0; 10],
            presence: 0.0,
            handedness: 0.0,
        };
        let roi = Roi::letterbox(10, 10);
        assert!(raw.to_pose(&roi, 10, 10).is_err());
    }
}
