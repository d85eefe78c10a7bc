use std::path::Path;

use crate::shared::frame::{Frame, PixelOrder};
use crate::video::domain::image_writer::ImageWriter;

/// Writes a single frame to an image file using the `image` crate.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if frame.channels() != 3 {
            return Err(format!("Cannot encode {}-channel frame", frame.channels()).into());
        }

        let mut data = frame.data().to_vec();
        if frame.order() == PixelOrder::Bgr {
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), data)
            .ok_or("Failed to create image from frame data")?;

        img.save(path)?;
        Ok(())
    }
}
