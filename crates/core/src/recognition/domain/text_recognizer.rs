use image::GrayImage;

/// One piece of text read by the OCR capability.
#[derive(Clone, Debug, PartialEq)]
pub struct TextHit {
    pub text: String,
    /// Mean per-character score in `[0, 1]`; informational only.
    pub confidence: f32,
}

/// Domain interface for optical character recognition on a preprocessed
/// (binarized) plate crop.
///
/// Hits come back in reading order. An empty vector means nothing legible.
pub trait TextRecognizer: Send {
    fn read_text(&mut self, image: &GrayImage) -> Result<Vec<TextHit>, Box<dyn std::error::Error>>;
}
