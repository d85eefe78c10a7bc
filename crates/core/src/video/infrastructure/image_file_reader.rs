use std::path::Path;

use crate::shared::frame::{Frame, PixelOrder};
use crate::video::domain::image_reader::ImageReader;

/// Decodes still images with the `image` crate.
///
/// Any format the crate can guess from the file contents is accepted; the
/// result is always a 3-channel frame in RGB order.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
        let img = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?
            .into_rgb8();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(format!("{}: image has no pixels", path.display()).into());
        }
        Ok(Frame::new(
            img.into_raw(),
            width,
            height,
            3,
            PixelOrder::Rgb,
            0,
        ))
    }
}
