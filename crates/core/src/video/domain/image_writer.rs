use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single frame to an image file.
///
/// The encoding is chosen from the path extension; the frame's pixel order
/// is honored so the file always has correct colors.
pub trait ImageWriter: Send {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
