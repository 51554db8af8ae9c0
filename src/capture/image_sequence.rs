use super::CaptureSource;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays the image files of a directory as frames, in file name order
pub struct ImageSequence {
    frames: std::vec::IntoIter<PathBuf>,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Reading frames from {}", dir.display());

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                frames.push(path);
            }
        }
        frames.sort();

        let Some(first) = frames.first() else {
            bail!("No image files in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        tracing::info!("{} frames at {}x{}", frames.len(), width, height);

        Ok(Self {
            frames: frames.into_iter(),
            width,
            height,
        })
    }
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.next() else {
            return Ok(None);
        };

        let frame = image::open(&path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .into_rgb8();

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lorenz-hands-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn plays_images_in_name_order_then_ends() {
        let dir = scratch_dir("sequence");
        RgbImage::from_pixel(4, 3, Rgb([200, 0, 0]))
            .save(dir.join("frame_002.png"))
            .unwrap();
        RgbImage::from_pixel(4, 3, Rgb([0, 200, 0]))
            .save(dir.join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequence::new(&dir).unwrap();
        assert_eq!(source.resolution(), (4, 3));

        let first = source.capture_frame().unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0), &Rgb([0, 200, 0]));
        let second = source.capture_frame().unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0), &Rgb([200, 0, 0]));
        assert!(source.capture_frame().unwrap().is_none());
        assert!(source.capture_frame().unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = scratch_dir("empty");
        assert!(ImageSequence::new(&dir).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
