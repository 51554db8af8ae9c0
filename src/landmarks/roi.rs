use super::types::{index, Landmark};
use std::f32::consts::PI;

/// Rotated rectangle in frame pixel coordinates
///
/// `rotation` is in radians; a positive angle turns the rectangle's "up"
/// axis clockwise on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
}

impl Roi {
    /// Square covering the whole frame, centred, used to letterbox the palm detector input
    pub fn letterbox(frame_width: u32, frame_height: u32) -> Self {
        let side = frame_width.max(frame_height) as f32;
        Self {
            center_x: frame_width as f32 / 2.0,
            center_y: frame_height as f32 / 2.0,
            width: side,
            height: side,
            rotation: 0.0,
        }
    }

    /// Map a point given in the ROI's own normalized space ([0,1] on both
    /// axes, origin top-left) to frame pixels
    pub fn project(&self, u: f32, v: f32) -> (f32, f32) {
        let a = (u - 0.5) * self.width;
        let b = (v - 0.5) * self.height;
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center_x + a * cos - b * sin,
            self.center_y + a * sin + b * cos,
        )
    }

    /// Move the centre along the ROI's own axes, in fractions of its size
    pub fn shifted(mut self, shift_x: f32, shift_y: f32) -> Self {
        let dx = self.width * shift_x;
        let dy = self.height * shift_y;
        let (sin, cos) = self.rotation.sin_cos();
        self.center_x += dx * cos - dy * sin;
        self.center_y += dx * sin + dy * cos;
        self
    }

    /// Make square on the long side, then scale
    pub fn square_scaled(mut self, scale: f32) -> Self {
        let side = self.width.max(self.height);
        self.width = side * scale;
        self.height = side * scale;
        self
    }

    /// Axis-aligned intersection over union, rotation ignored
    pub fn overlap(&self, other: &Roi) -> f32 {
        let bounds = |r: &Roi| {
            (
                r.center_x - r.width / 2.0,
                r.center_y - r.height / 2.0,
                r.center_x + r.width / 2.0,
                r.center_y + r.height / 2.0,
            )
        };
        iou(bounds(self), bounds(other))
    }

    /// Tracking ROI for the next frame, computed from this frame's landmarks
    ///
    /// `landmarks` are normalized to a `frame_width` x `frame_height` frame.
    pub fn from_landmarks(
        landmarks: &[Landmark],
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let px = |i: usize| (landmarks[i].x * fw, landmarks[i].y * fh);

        let (x0, y0) = px(index::WRIST);
        let (ix, iy) = px(index::INDEX_MCP);
        let (rx, ry) = px(index::RING_MCP);
        let (mx, my) = px(index::MIDDLE_MCP);
        let x1 = ((ix + rx) / 2.0 + mx) / 2.0;
        let y1 = ((iy + ry) / 2.0 + my) / 2.0;
        let rotation = rotation_towards(x0, y0, x1, y1);

        // Bounding box of the palm and lower finger joints in the rotated frame
        let (sin, cos) = (-rotation).sin_cos();
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for &i in PALM_JOINTS.iter() {
            let (x, y) = px(i);
            let rx = x * cos - y * sin;
            let ry = x * sin + y * cos;
            min_x = min_x.min(rx);
            min_y = min_y.min(ry);
            max_x = max_x.max(rx);
            max_y = max_y.max(ry);
        }
        let (cx, cy) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
        let (sin, cos) = rotation.sin_cos();

        Self {
            center_x: cx * cos - cy * sin,
            center_y: cx * sin + cy * cos,
            width: max_x - min_x,
            height: max_y - min_y,
            rotation,
        }
        .shifted(0.0, -0.1)
        .square_scaled(2.0)
    }
}

const PALM_JOINTS: [usize; 12] = [
    index::WRIST,
    index::THUMB_CMC,
    index::THUMB_MCP,
    index::THUMB_IP,
    index::INDEX_MCP,
    index::INDEX_PIP,
    index::MIDDLE_MCP,
    index::MIDDLE_PIP,
    index::RING_MCP,
    index::RING_PIP,
    index::PINKY_MCP,
    index::PINKY_PIP,
];

/// Rotation that turns the vector (x0,y0) -> (x1,y1) to point straight up
pub fn rotation_towards(x0: f32, y0: f32, x1: f32, y1: f32) -> f32 {
    normalize_radians(PI / 2.0 - (-(y1 - y0)).atan2(x1 - x0))
}

pub fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Intersection over union of two (xmin, ymin, xmax, ymax) boxes
pub fn iou(a: (f32, f32, f32, f32), b: (f32, f32, f32, f32)) -> f32 {
    let ix = (a.2.min(b.2) - a.0.max(b.0)).max(0.0);
    let iy = (a.3.min(b.3) - a.1.max(b.1)).max(0.0);
    let intersection = ix * iy;
    let union = (a.2 - a.0) * (a.3 - a.1) + (b.2 - b.0) * (b.3 - b.1) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
