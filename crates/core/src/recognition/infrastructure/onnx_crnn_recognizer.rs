/// CRNN text recognizer using ONNX Runtime via `ort`.
///
/// Expects a PaddleOCR-style recognition model: NCHW float input with a
/// fixed height, output `[1, timesteps, vocab]` of per-step probabilities
/// decoded greedily with CTC (blank at index 0).
use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use image::GrayImage;

use crate::detection::infrastructure::execution_provider::build_session;
use crate::recognition::domain::text_recognizer::{TextHit, TextRecognizer};

/// Latin digits and letters plus the Polish diacritics.
pub const LATIN_PL_CHARSET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyzĄĆĘŁŃÓŚŹŻąćęłńóśźż";

const DEFAULT_INPUT_HEIGHT: u32 = 48;
const MAX_INPUT_WIDTH: u32 = 320;

pub struct OnnxCrnnRecognizer {
    session: ort::session::Session,
    /// Index 0 is the CTC blank.
    keys: Vec<String>,
    input_height: u32,
}

impl OnnxCrnnRecognizer {
    /// Load a model whose vocabulary is one character per line in
    /// `dictionary_path`.
    pub fn from_dictionary_file(
        model_path: &Path,
        dictionary_path: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(dictionary_path)?;
        Self::new(model_path, content.lines().map(str::to_string).collect())
    }

    /// Load a model trained on [`LATIN_PL_CHARSET`].
    pub fn with_latin_pl_charset(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(model_path, LATIN_PL_CHARSET.chars().map(String::from).collect())
    }

    fn new(model_path: &Path, dictionary: Vec<String>) -> Result<Self, Box<dyn std::error::Error>> {
        if dictionary.is_empty() {
            return Err("OCR dictionary is empty".into());
        }
        let session = build_session(model_path)?;
        let input_height = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_HEIGHT);

        log::debug!(
            "OCR model loaded: {} symbols, input height {input_height}px",
            dictionary.len()
        );
        Ok(Self {
            session,
            keys: ctc_keys(dictionary),
            input_height,
        })
    }
}

impl TextRecognizer for OnnxCrnnRecognizer {
    fn read_text(&mut self, image: &GrayImage) -> Result<Vec<TextHit>, Box<dyn std::error::Error>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let tensor = to_input_tensor(image, self.input_height);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("OCR model produced no outputs".into());
        }
        let probs = outputs[0].try_extract_array::<f32>()?;
        let shape = probs.shape();
        if shape.len() != 3 {
            return Err(format!("Unexpected OCR output shape: {shape:?}").into());
        }
        let (timesteps, vocab) = (shape[1], shape[2]);
        let data = probs.as_slice().ok_or("Cannot get tensor slice")?;

        let hit = decode_ctc(&data[..timesteps * vocab], timesteps, vocab, &self.keys);
        Ok(if hit.text.is_empty() { Vec::new() } else { vec![hit] })
    }
}

/// Blank token first, space token last.
fn ctc_keys(dictionary: Vec<String>) -> Vec<String> {
    let mut keys = Vec::with_capacity(dictionary.len() + 2);
    keys.push(String::new());
    keys.extend(dictionary);
    keys.push(" ".to_string());
    keys
}

/// Resize to the model height keeping aspect ratio, replicate the single
/// channel to three and normalize to `[-1, 1]`.
fn to_input_tensor(image: &GrayImage, height: u32) -> ndarray::Array4<f32> {
    let ratio = image.width() as f64 / image.height() as f64;
    let width = ((height as f64 * ratio).ceil() as u32).clamp(1, MAX_INPUT_WIDTH);
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let v = (pixel.0[0] as f32 / 255.0 - 0.5) / 0.5;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}

/// Greedy CTC decoding: per-step argmax, skip blanks and repeats.
fn decode_ctc(probs: &[f32], timesteps: usize, vocab: usize, keys: &[String]) -> TextHit {
    let mut text = String::new();
    let mut scores = Vec::new();
    let mut last_index = 0;

    for t in 0..timesteps {
        let step = &probs[t * vocab..(t + 1) * vocab];
        let Some((index, &score)) = step.iter().enumerate().max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };
        if index > 0 && index < keys.len() && index != last_index {
            text.push_str(&keys[index]);
            scores.push(score);
        }
        last_index = index;
    }

    let confidence = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };
    TextHit { text, confidence }
}
