use thiserror::Error;

use crate::detection::domain::plate_localizer::PlateLocalizer;
use crate::recognition::domain::region_preprocessor::{crop_gray, preprocess};
use crate::recognition::domain::text_normalizer::normalize;
use crate::recognition::domain::text_recognizer::TextRecognizer;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Failures of the model-backed capabilities. These are the only errors
/// allowed to escape the plate pipeline.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("plate detection failed: {0}")]
    DetectionFailure(Box<dyn std::error::Error>),
    #[error("text recognition failed: {0}")]
    OcrFailure(Box<dyn std::error::Error>),
}

/// A single OCR hit inside a located region, after normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct PlateReading {
    pub region: Region,
    pub raw_text: String,
    pub plate: String,
    pub confidence: f32,
}

/// Localizer + OCR pair injected at construction, so several independent
/// engines (or test doubles) can coexist.
pub struct RecognitionEngine {
    localizer: Box<dyn PlateLocalizer>,
    recognizer: Box<dyn TextRecognizer>,
}

impl RecognitionEngine {
    pub fn new(localizer: Box<dyn PlateLocalizer>, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            localizer,
            recognizer,
        }
    }

    /// Candidate regions, re-clipped to the frame so every one of them can
    /// be cropped. Boxes with nothing left inside the frame are dropped.
    pub fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, RecognitionError> {
        let regions = self
            .localizer
            .locate(frame)
            .map_err(RecognitionError::DetectionFailure)?;
        Ok(regions
            .into_iter()
            .filter_map(|r| clip_to_frame(&r, frame))
            .collect())
    }

    /// Crops, binarizes and reads one region. Every OCR hit yields one
    /// reading, in the order the recognizer returned them.
    ///
    /// The region is clipped to the frame first; one lying wholly outside
    /// it reads as nothing and the recognizer is not called.
    pub fn read_region(
        &mut self,
        frame: &Frame,
        region: &Region,
    ) -> Result<Vec<PlateReading>, RecognitionError> {
        let Some(region) = clip_to_frame(region, frame) else {
            log::debug!("Region {region:?} lies outside the frame, skipping");
            return Ok(Vec::new());
        };
        let binary = preprocess(&crop_gray(frame, &region));
        let hits = self
            .recognizer
            .read_text(&binary)
            .map_err(RecognitionError::OcrFailure)?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let plate = normalize(&hit.text);
                log::debug!("OCR hit {:?} -> {plate}", hit.text);
                PlateReading {
                    region,
                    plate,
                    raw_text: hit.text,
                    confidence: hit.confidence,
                }
            })
            .collect())
    }
}

fn clip_to_frame(region: &Region, frame: &Frame) -> Option<Region> {
    Region::clipped(
        region.x1 as f64,
        region.y1 as f64,
        region.x2 as f64,
        region.y2 as f64,
        frame.width(),
        frame.height(),
    )
}
