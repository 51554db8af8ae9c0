use super::preprocess::Preprocessor;
use super::roi::{iou, rotation_towards, Roi};
use super::types::ModelError;
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{ArrayView2, Axis, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

const INPUT_SIZE: u32 = 192;
const NUM_COORDS: usize = 18;
const NUM_KEYPOINTS: usize = 7;
const SCORE_CLIP: f32 = 100.0;
const NMS_IOU: f32 = 0.3;

/// SSD anchor centre in normalized input coordinates
///
/// Anchors have a fixed unit size, so only the centre is kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// Anchor layout of the 192x192 palm detector
///
/// Four layers with strides 8, 16, 16, 16. Layers sharing a stride share a
/// feature map, and every layer contributes two anchors per cell.
pub fn palm_anchors() -> Vec<Anchor> {
    const STRIDES: [u32; 4] = [8, 16, 16, 16];
    const ANCHORS_PER_LAYER: usize = 2;

    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let mut per_cell = 0;
        while layer < STRIDES.len() && STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let cells = INPUT_SIZE.div_ceil(stride);
        for row in 0..cells {
            for col in 0..cells {
                let anchor = Anchor {
                    x: (col as f32 + 0.5) / cells as f32,
                    y: (row as f32 + 0.5) / cells as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

/// A palm found by the detector, in normalized letterboxed input coordinates
#[derive(Clone, Debug, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    /// Wrist, index MCP, middle MCP, ring MCP, pinky MCP, thumb CMC, thumb MCP
    pub keypoints: [(f32, f32); NUM_KEYPOINTS],
}

impl PalmDetection {
    fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.center_x + self.width / 2.0,
            self.center_y + self.height / 2.0,
        )
    }

    /// Hand ROI in frame pixels for a detection made inside `letterbox`
    pub fn to_roi(&self, letterbox: &Roi) -> Roi {
        let (cx, cy) = letterbox.project(self.center_x, self.center_y);
        let (x0, y0) = letterbox.project(self.keypoints[0].0, self.keypoints[0].1);
        let (x1, y1) = letterbox.project(self.keypoints[2].0, self.keypoints[2].1);

        Roi {
            center_x: cx,
            center_y: cy,
            width: self.width * letterbox.width,
            height: self.height * letterbox.height,
            rotation: rotation_towards(x0, y0, x1, y1),
        }
        .shifted(0.0, -0.5)
        .square_scaled(2.6)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode raw regressor rows and score logits against their anchors
pub fn decode(
    boxes: ArrayView2<f32>,
    scores: &[f32],
    anchors: &[Anchor],
    min_score: f32,
) -> Vec<PalmDetection> {
    let scale = INPUT_SIZE as f32;

    anchors
        .iter()
        .zip(scores)
        .zip(boxes.axis_iter(Axis(0)))
        .filter_map(|((anchor, &logit), raw)| {
            let score = sigmoid(logit.clamp(-SCORE_CLIP, SCORE_CLIP));
            if score < min_score {
                return None;
            }

            let mut keypoints = [(0.0, 0.0); NUM_KEYPOINTS];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                *kp = (
                    raw[4 + 2 * k] / scale + anchor.x,
                    raw[5 + 2 * k] / scale + anchor.y,
                );
            }

            Some(PalmDetection {
                score,
                center_x: raw[0] / scale + anchor.x,
                center_y: raw[1] / scale + anchor.y,
                width: raw[2] / scale,
                height: raw[3] / scale,
                keypoints,
            })
        })
        .collect()
}

/// Weighted non-maximum suppression
///
/// Overlapping detections are merged into one whose geometry is the
/// score-weighted mean of the cluster and whose score is the best member's.
pub fn weighted_nms(mut detections: Vec<PalmDetection>, iou_threshold: f32) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut merged = Vec::new();
    while !detections.is_empty() {
        let best = detections[0].bounds();
        let (cluster, rest): (Vec<_>, Vec<_>) = detections
            .into_iter()
            .enumerate()
            .partition(|(i, d)| *i == 0 || iou(best, d.bounds()) > iou_threshold);
        detections = rest.into_iter().map(|(_, d)| d).collect();
        let cluster: Vec<PalmDetection> = cluster.into_iter().map(|(_, d)| d).collect();
        let top = &cluster[0];

        let total: f32 = cluster.iter().map(|d| d.score).sum();
        let mut out = top.clone();
        let weighted = |f: &dyn Fn(&PalmDetection) -> f32| {
            cluster.iter().map(|d| f(d) * d.score).sum::<f32>() / total
        };
        out.center_x = weighted(&|d| d.center_x);
        out.center_y = weighted(&|d| d.center_y);
        out.width = weighted(&|d| d.width);
        out.height = weighted(&|d| d.height);
        for k in 0..NUM_KEYPOINTS {
            out.keypoints[k] = (
                weighted(&|d| d.keypoints[k].0),
                weighted(&|d| d.keypoints[k].1),
            );
        }
        merged.push(out);
    }
    merged
}

/// MediaPipe palm detection model (192x192 input)
pub struct PalmDetector {
    session: Session,
    preprocessor: Preprocessor,
    anchors: Vec<Anchor>,
}

impl PalmDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = super::load_session(model_path.as_ref())?;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            anchors: palm_anchors(),
        })
    }

    /// Find palms in a frame, best first, at most `max_palms`
    ///
    /// Returns each palm as a hand ROI in frame pixels.
    pub fn detect(&mut self, frame: &RgbImage, min_score: f32, max_palms: usize) -> Result<Vec<Roi>> {
        let _span = tracing::debug_span!("palm_detect").entered();

        let (width, height) = frame.dimensions();
        let letterbox = Roi::letterbox(width, height);
        let input = self.preprocessor.crop(frame, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("Failed to run palm detection")?;

        // Output order differs between exports; tell them apart by shape
        let mut boxes = None;
        let mut scores = None;
        for i in 0..outputs.len() {
            let tensor = outputs[i]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix3>()?;
            match tensor.shape()[2] {
                NUM_COORDS => boxes = Some(tensor.index_axis(Axis(0), 0).to_owned()),
                1 => scores = Some(tensor.iter().copied().collect::<Vec<f32>>()),
                _ => {}
            }
        }
        let (Some(boxes), Some(scores)) = (boxes, scores) else {
            return Err(ModelError::MissingOutput("palm regressors and scores").into());
        };
        if boxes.nrows() != self.anchors.len() || scores.len() != self.anchors.len() {
            return Err(ModelError::UnexpectedShape {
                expected: format!("{} anchors", self.anchors.len()),
                actual: format!("{} boxes, {} scores", boxes.nrows(), scores.len()),
            }
            .into());
        }

        let candidates = decode(boxes.view(), &scores, &self.anchors, min_score);
        let palms = weighted_nms(candidates, NMS_IOU);
        tracing::debug!("{} palm(s) detected", palms.len());

        Ok(palms
            .iter()
            .take(max_palms)
            .map(|palm| palm.to_roi(&letterbox))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn detection(score: f32, cx: f32, cy: f32, size: f32) -> PalmDetection {
        PalmDetection {
            score,
            center_x: cx,
            center_y: cy,
            width: size,
            height: size,
            keypoints: [(cx, cy); NUM_KEYPOINTS],
        }
    }

    #[test]
    fn anchor_layout_matches_model() {
        let anchors = palm_anchors();
        assert_eq!(anchors.len(), 2016);
        // First feature map: 24x24 cells, two anchors each
        assert_eq!(anchors[0], Anchor { x: 0.5 / 24.0, y: 0.5 / 24.0 });
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2].x, 1.5 / 24.0);
        // Second feature map: 12x12 cells, six anchors each
        assert_eq!(anchors[1152], Anchor { x: 0.5 / 12.0, y: 0.5 / 12.0 });
        assert_eq!(anchors[1157], anchors[1152]);
        assert_eq!(anchors[1158].x, 1.5 / 12.0);
    }

    #[test]
    fn decode_offsets_from_anchor_and_filters_scores() {
        let anchors = [Anchor { x: 0.5, y: 0.5 }, Anchor { x: 0.25, y: 0.25 }];
        let mut boxes = Array2::<f32>::zeros((2, NUM_COORDS));
        boxes[[0, 0]] = 19.2;
        boxes[[0, 2]] = 96.0;
        boxes[[0, 3]] = 48.0;
        boxes[[0, 4]] = -19.2;
        let scores = [5.0, -5.0];

        let found = decode(boxes.view(), &scores, &anchors, 0.5);
        assert_eq!(found.len(), 1);
        let palm = &found[0];
        assert!((palm.center_x - 0.6).abs() < 1e-5);
        assert!((palm.center_y - 0.5).abs() < 1e-5);
        assert!((palm.width - 0.5).abs() < 1e-5);
        assert!((palm.height - 0.25).abs() < 1e-5);
        assert!((palm.keypoints[0].0 - 0.4).abs() < 1e-5);
        assert!(palm.score > 0.99);
    }

    #[test]
    fn huge_logits_are_clipped() {
        let anchors = [Anchor { x: 0.5, y: 0.5 }];
        let boxes = Array2::<f32>::zeros((1, NUM_COORDS));
        let found = decode(boxes.view(), &[1e9], &anchors, 0.5);
        assert!(found[0].score.is_finite());
    }

    #[test]
    fn nms_merges_overlapping_and_keeps_separate() {
        let detections = vec![
            detection(0.6, 0.52, 0.5, 0.2),
            detection(0.9, 0.5, 0.5, 0.2),
            detection(0.8, 0.1, 0.1, 0.1),
        ];
        let merged = weighted_nms(detections, 0.3);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].score, 0.9);
        // Pulled slightly towards the weaker overlapping box
        assert!(merged[0].center_x > 0.5 && merged[0].center_x < 0.52);
        assert!((merged[1].center_x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn roi_from_upright_palm_extends_towards_fingers() {
        let mut palm = detection(0.9, 0.5, 0.5, 0.2);
        palm.keypoints[0] = (0.5, 0.6);
        palm.keypoints[2] = (0.5, 0.4);
        let roi = palm.to_roi(&Roi::letterbox(100, 100));
        assert!(roi.rotation.abs() < 1e-4);
        assert!((roi.center_y - 40.0).abs() < 1e-3);
        assert!((roi.width - 52.0).abs() < 1e-3);
    }
}
