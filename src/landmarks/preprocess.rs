use super::roi::Roi;
use image::RgbImage;
use ndarray::Array4;

/// Preprocessor for cutting model input tensors out of RGB frames
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Crop a (possibly rotated) region of interest into a normalized NHWC tensor
    ///
    /// Steps:
    /// 1. Map every output pixel centre back into the frame through the ROI
    /// 2. Sample bilinearly, zero outside the frame
    /// 3. Normalize to [0, 1]
    ///
    /// Returns: Array4<f32> with shape [1, height, width, 3]
    pub fn crop(&self, image: &RgbImage, roi: &Roi) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = (self.target_width as usize, self.target_height as usize);
        let mut tensor = Array4::<f32>::zeros((1, height, width, 3));

        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let (sx, sy) = roi.project(u, v);
                let pixel = sample_bilinear(image, sx - 0.5, sy - 0.5);

                for c in 0..3 {
                    tensor[[0, y, x, c]] = pixel[c] / 255.0;
                }
            }
        }

        tensor
    }
}

/// Bilinear sample at continuous pixel coordinates (pixel centres on integers)
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let (width, height) = image.dimensions();
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1.0, y0);
    let bl = fetch(x0, y0 + 1.0);
    let br = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bottom = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = top + (bottom - top) * fy;
    }
    out
}
