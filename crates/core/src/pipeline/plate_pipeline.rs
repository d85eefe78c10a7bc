use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use thiserror::Error;

use crate::authorization::domain::authorization_store::AuthorizationStore;
use crate::authorization::domain::detection_event::DetectionEvent;
use crate::authorization::domain::detection_log::DetectionLog;
use crate::pipeline::annotation::draw_region;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::recognition::domain::recognition_engine::{
    PlateReading, RecognitionEngine, RecognitionError,
};
use crate::shared::constants::{COMMENT_DENIED, COMMENT_GRANTED, COMMENT_STORE_ERROR};
use crate::shared::frame::Frame;
use crate::video::domain::detection_archive::DetectionArchive;
use crate::video::domain::image_reader::ImageReader;

/// The only failures that escape [`PlatePipeline::run`]: the localizer or
/// the OCR model could not process the frame.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// What the pipeline was asked to look at.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// An image file to decode.
    Path(PathBuf),
    /// An already decoded frame (e.g. from a stream).
    Frame(Frame),
}

impl From<Frame> for PipelineInput {
    fn from(frame: Frame) -> Self {
        PipelineInput::Frame(frame)
    }
}

impl From<&Path> for PipelineInput {
    fn from(path: &Path) -> Self {
        PipelineInput::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for PipelineInput {
    fn from(path: PathBuf) -> Self {
        PipelineInput::Path(path)
    }
}

/// Result of one pipeline pass over a frame.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    /// Normalized plate of the last reading, `None` when nothing was read.
    pub plate_text: Option<String>,
    /// Access decision for `plate_text`, `None` when nothing was read.
    pub comment: Option<String>,
    /// Annotated frame in display (RGB) order.
    pub frame: Frame,
    /// Every reading in the frame, in region order then OCR hit order.
    pub readings: Vec<PlateReading>,
    /// Where the annotated frame was archived, if it was.
    pub artifact: Option<PathBuf>,
}

impl DetectionOutcome {
    /// Outcome for a frame that was not recognized at all.
    pub fn passthrough(frame: Frame) -> Self {
        Self {
            plate_text: None,
            comment: None,
            frame,
            readings: Vec::new(),
            artifact: None,
        }
    }

    pub fn detection_made(&self) -> bool {
        !self.readings.is_empty()
    }
}

/// Locate → read → normalize → authorize → log and archive → annotate.
///
/// Every collaborator is injected, so independent pipelines (and test
/// doubles) can coexist. Only model failures are returned as errors;
/// unreadable input, store errors and persistence errors all degrade to a
/// valid outcome.
pub struct PlatePipeline {
    engine: RecognitionEngine,
    authorizations: Box<dyn AuthorizationStore>,
    detection_log: Box<dyn DetectionLog>,
    archive: Box<dyn DetectionArchive>,
    image_reader: Box<dyn ImageReader>,
    logger: Box<dyn PipelineLogger>,
}

impl PlatePipeline {
    pub fn new(
        engine: RecognitionEngine,
        authorizations: Box<dyn AuthorizationStore>,
        detection_log: Box<dyn DetectionLog>,
        archive: Box<dyn DetectionArchive>,
        image_reader: Box<dyn ImageReader>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            engine,
            authorizations,
            detection_log,
            archive,
            image_reader,
            logger,
        }
    }

    /// Runs the pipeline once.
    ///
    /// Returns `Ok(None)` when the input cannot be loaded; nothing is
    /// written in that case.
    pub fn run(
        &mut self,
        input: impl Into<PipelineInput>,
    ) -> Result<Option<DetectionOutcome>, PipelineError> {
        let Some(mut frame) = self.load(input.into()) else {
            return Ok(None);
        };

        let started = Instant::now();
        let regions = self.engine.locate(&frame)?;
        self.logger.timing("locate", elapsed_ms(started));
        self.logger.metric("regions", regions.len() as f64);

        // Every region is read from the clean frame before any outline is drawn
        let started = Instant::now();
        let mut readings = Vec::new();
        for region in &regions {
            readings.extend(self.engine.read_region(&frame, region)?);
        }
        if !regions.is_empty() {
            self.logger.timing("recognize", elapsed_ms(started));
        }
        for region in &regions {
            draw_region(&mut frame, region);
        }

        let Some(last) = readings.last() else {
            return Ok(Some(DetectionOutcome::passthrough(frame.into_display_order())));
        };
        let plate = last.plate.clone();
        let comment = self.authorize(&plate);
        let artifact = self.persist(&frame, &plate, &comment);

        Ok(Some(DetectionOutcome {
            plate_text: Some(plate),
            comment: Some(comment),
            frame: frame.into_display_order(),
            readings,
            artifact,
        }))
    }

    pub fn logger_mut(&mut self) -> &mut dyn PipelineLogger {
        self.logger.as_mut()
    }

    pub fn summary(&self) {
        self.logger.summary();
    }

    fn load(&self, input: PipelineInput) -> Option<Frame> {
        let frame = match input {
            PipelineInput::Frame(frame) => frame,
            PipelineInput::Path(path) => match self.image_reader.read(&path) {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("Failed to load image {}: {e}", path.display());
                    return None;
                }
            },
        };
        if !is_usable(&frame) {
            log::error!(
                "Unusable frame {}x{}x{} ({} bytes)",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.data().len()
            );
            return None;
        }
        Some(frame)
    }

    fn authorize(&mut self, plate: &str) -> String {
        let started = Instant::now();
        let comment = match self.authorizations.is_authorized(plate) {
            Ok(true) => COMMENT_GRANTED,
            Ok(false) => COMMENT_DENIED,
            Err(e) => {
                log::error!("Authorization lookup for {plate} failed: {e}");
                COMMENT_STORE_ERROR
            }
        };
        self.logger.timing("authorize", elapsed_ms(started));
        comment.to_string()
    }

    /// Archives the annotated frame and appends the detection event.
    /// Failures are reported on the error log and otherwise ignored.
    fn persist(&mut self, frame: &Frame, plate: &str, comment: &str) -> Option<PathBuf> {
        let started = Instant::now();
        let timestamp = Local::now();

        let artifact = match self.archive.store(frame, timestamp) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Failed to save detection image: {e}");
                None
            }
        };

        let event = DetectionEvent {
            timestamp,
            plate: plate.to_string(),
            comment: comment.to_string(),
            image_path: artifact.clone(),
        };
        if let Err(e) = self.detection_log.append(&event) {
            log::error!("Failed to write detection log entry for {plate}: {e}");
        }

        self.logger.timing("persist", elapsed_ms(started));
        self.logger.info(&format!("{plate}: {comment}"));
        artifact
    }
}

fn is_usable(frame: &Frame) -> bool {
    frame.channels() == 3
        && frame.width() > 0
        && frame.height() > 0
        && frame.data().len() == frame.width() as usize * frame.height() as usize * 3
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::domain::plate_localizer::PlateLocalizer;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::recognition::domain::text_recognizer::{TextHit, TextRecognizer};
    use crate::shared::frame::PixelOrder;
    use crate::shared::region::Region;
    use chrono::{DateTime, Local};
    use image::GrayImage;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    pub(crate) struct StubLocalizer {
        pub regions: Vec<Region>,
        pub fail: bool,
    }

    impl PlateLocalizer for StubLocalizer {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("detector crashed".into());
            }
            Ok(self.regions.clone())
        }
    }

    /// Returns one scripted batch of texts per call, then nothing.
    pub(crate) struct ScriptedRecognizer {
        pub batches: VecDeque<Vec<&'static str>>,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn read_text(
            &mut self,
            _image: &GrayImage,
        ) -> Result<Vec<TextHit>, Box<dyn std::error::Error>> {
            Ok(self
                .batches
                .pop_front()
                .unwrap_or_default()
                .into_iter()
                .map(|text| TextHit {
                    text: text.to_string(),
                    confidence: 0.9,
                })
                .collect())
        }
    }

    #[derive(Default)]
    pub(crate) struct Writes {
        pub lookups: Vec<String>,
        pub events: Vec<DetectionEvent>,
        pub artifacts: Vec<Frame>,
        pub reads: usize,
    }

    pub(crate) type SharedWrites = Arc<Mutex<Writes>>;

    pub(crate) struct StubStore {
        pub authorized: Vec<&'static str>,
        pub fail: bool,
        pub writes: SharedWrites,
    }

    impl AuthorizationStore for StubStore {
        fn is_authorized(&self, plate: &str) -> Result<bool, Box<dyn std::error::Error>> {
            self.writes.lock().unwrap().lookups.push(plate.to_string());
            if self.fail {
                return Err("database is locked".into());
            }
            Ok(self.authorized.contains(&plate))
        }
    }

    pub(crate) struct StubLog {
        pub fail: bool,
        pub writes: SharedWrites,
    }

    impl DetectionLog for StubLog {
        fn append(&self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail {
                return Err("no such table: detection_logs".into());
            }
            self.writes.lock().unwrap().events.push(event.clone());
            Ok(())
        }
    }

    pub(crate) struct StubArchive {
        pub fail: bool,
        pub writes: SharedWrites,
    }

    impl DetectionArchive for StubArchive {
        fn store(
            &self,
            frame: &Frame,
            _taken_at: DateTime<Local>,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("disk full".into());
            }
            let mut writes = self.writes.lock().unwrap();
            writes.artifacts.push(frame.clone());
            Ok(PathBuf::from(format!("detection_{}.jpg", writes.artifacts.len())))
        }
    }

    pub(crate) struct StubImageReader {
        pub frame: Option<Frame>,
        pub writes: SharedWrites,
    }

    impl ImageReader for StubImageReader {
        fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            self.writes.lock().unwrap().reads += 1;
            self.frame
                .clone()
                .ok_or_else(|| format!("cannot decode {}", path.display()).into())
        }
    }

    // --- Helpers ---

    pub(crate) fn gray_frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![128; (w * h * 3) as usize], w, h, 3, PixelOrder::Bgr, 0)
    }

    pub(crate) struct Fixture {
        pub regions: Vec<Region>,
        pub texts: Vec<Vec<&'static str>>,
        pub authorized: Vec<&'static str>,
        pub store_fails: bool,
        pub log_fails: bool,
        pub archive_fails: bool,
        pub detector_fails: bool,
        pub image: Option<Frame>,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                regions: Vec::new(),
                texts: Vec::new(),
                authorized: Vec::new(),
                store_fails: false,
                log_fails: false,
                archive_fails: false,
                detector_fails: false,
                image: Some(gray_frame(64, 48)),
            }
        }
    }

    impl Fixture {
        pub fn build(self) -> (PlatePipeline, SharedWrites) {
            let writes = SharedWrites::default();
            let engine = RecognitionEngine::new(
                Box::new(StubLocalizer {
                    regions: self.regions,
                    fail: self.detector_fails,
                }),
                Box::new(ScriptedRecognizer {
                    batches: self.texts.into(),
                }),
            );
            let pipeline = PlatePipeline::new(
                engine,
                Box::new(StubStore {
                    authorized: self.authorized,
                    fail: self.store_fails,
                    writes: writes.clone(),
                }),
                Box::new(StubLog {
                    fail: self.log_fails,
                    writes: writes.clone(),
                }),
                Box::new(StubArchive {
                    fail: self.archive_fails,
                    writes: writes.clone(),
                }),
                Box::new(StubImageReader {
                    frame: self.image,
                    writes: writes.clone(),
                }),
                Box::new(NullPipelineLogger),
            );
            (pipeline, writes)
        }
    }

    fn plate_region() -> Region {
        Region { x1: 8, y1: 10, x2: 40, y2: 26 }
    }

    // --- Tests ---

    #[test]
    fn test_unreadable_path_is_soft_failure_without_writes() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["KR12345"]],
            image: None,
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(Path::new("/nonexistent/car.jpg")).unwrap();

        assert!(outcome.is_none());
        let writes = writes.lock().unwrap();
        assert_eq!(writes.reads, 1);
        assert!(writes.lookups.is_empty());
        assert!(writes.events.is_empty());
        assert!(writes.artifacts.is_empty());
    }

    #[test]
    fn test_malformed_frame_is_soft_failure() {
        let (mut pipeline, _) = Fixture::default().build();
        let gray = Frame::new(vec![0; 16], 4, 4, 1, PixelOrder::Bgr, 0);
        assert!(pipeline.run(gray).unwrap().is_none());
    }

    #[test]
    fn test_no_regions_returns_clean_frame_and_writes_nothing() {
        let (mut pipeline, writes) = Fixture::default().build();
        let input = gray_frame(64, 48);

        let outcome = pipeline.run(input.clone()).unwrap().unwrap();

        assert_eq!(outcome.plate_text, None);
        assert_eq!(outcome.comment, None);
        assert!(!outcome.detection_made());
        assert_eq!(outcome.frame.order(), PixelOrder::Rgb);
        assert_eq!(outcome.frame.data(), input.data());
        let writes = writes.lock().unwrap();
        assert!(writes.lookups.is_empty());
        assert!(writes.events.is_empty());
        assert!(writes.artifacts.is_empty());
    }

    #[test]
    fn test_region_without_text_is_drawn_but_not_logged() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec![]],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text, None);
        assert_ne!(outcome.frame.data(), gray_frame(64, 48).data());
        assert!(writes.lock().unwrap().events.is_empty());
    }

    #[test]
    fn test_authorized_plate_is_granted_and_persisted_once() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["kr-12345"]],
            authorized: vec!["KR12345"],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("KR12345"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_GRANTED));
        assert_eq!(outcome.artifact, Some(PathBuf::from("detection_1.jpg")));

        let writes = writes.lock().unwrap();
        assert_eq!(writes.lookups, vec!["KR12345"]);
        assert_eq!(writes.events.len(), 1);
        assert_eq!(writes.events[0].plate, "KR12345");
        assert_eq!(writes.events[0].comment, COMMENT_GRANTED);
        assert_eq!(writes.events[0].image_path, outcome.artifact);
        assert_eq!(writes.artifacts.len(), 1);
    }

    #[test]
    fn test_unknown_plate_is_denied() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["WX 999"]],
            authorized: vec!["KR12345"],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("WX999"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_DENIED));
        assert_eq!(writes.lock().unwrap().events[0].comment, COMMENT_DENIED);
    }

    #[test]
    fn test_store_failure_keeps_plate_and_still_persists() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["KR12345"]],
            store_fails: true,
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("KR12345"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_STORE_ERROR));
        let writes = writes.lock().unwrap();
        assert_eq!(writes.events.len(), 1);
        assert_eq!(writes.events[0].comment, COMMENT_STORE_ERROR);
        assert_eq!(writes.artifacts.len(), 1);
    }

    #[test]
    fn test_log_failure_does_not_change_result() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["KR12345"]],
            authorized: vec!["KR12345"],
            log_fails: true,
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("KR12345"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_GRANTED));
        assert_eq!(writes.lock().unwrap().artifacts.len(), 1);
    }

    #[test]
    fn test_archive_failure_still_logs_event_without_image() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["KR12345"]],
            authorized: vec!["KR12345"],
            archive_fails: true,
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("KR12345"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_GRANTED));
        assert_eq!(outcome.artifact, None);
        let writes = writes.lock().unwrap();
        assert!(writes.artifacts.is_empty());
        assert_eq!(writes.events.len(), 1);
        assert_eq!(writes.events[0].plate, "KR12345");
        assert_eq!(writes.events[0].image_path, None);
    }

    #[test]
    fn test_all_readings_kept_and_last_one_decides() {
        let first = Region { x1: 0, y1: 0, x2: 20, y2: 10 };
        let second = Region { x1: 30, y1: 20, x2: 60, y2: 40 };
        let (mut pipeline, writes) = Fixture {
            regions: vec![first, second],
            texts: vec![vec!["KR111", "noise"], vec!["PO 222"]],
            authorized: vec!["KR111"],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        let plates: Vec<_> = outcome.readings.iter().map(|r| r.plate.as_str()).collect();
        assert_eq!(plates, vec!["KR111", "N01SE", "PO222"]);
        assert_eq!(outcome.readings[0].region, first);
        assert_eq!(outcome.readings[2].region, second);
        assert_eq!(outcome.plate_text.as_deref(), Some("PO222"));
        assert_eq!(outcome.comment.as_deref(), Some(COMMENT_DENIED));

        let writes = writes.lock().unwrap();
        assert_eq!(writes.lookups, vec!["PO222"]);
        assert_eq!(writes.events.len(), 1);
        assert_eq!(writes.artifacts.len(), 1);
    }

    #[test]
    fn test_every_region_is_outlined_in_green() {
        let first = Region { x1: 2, y1: 2, x2: 20, y2: 12 };
        let second = Region { x1: 30, y1: 20, x2: 60, y2: 40 };
        let (mut pipeline, writes) = Fixture {
            regions: vec![first, second],
            texts: vec![vec![], vec!["KR1"]],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(gray_frame(64, 48)).unwrap().unwrap();

        let px = |frame: &Frame, x: u32, y: u32| {
            let i = ((y * frame.width() + x) * 3) as usize;
            frame.data()[i..i + 3].to_vec()
        };
        assert_eq!(px(&outcome.frame, 2, 2), vec![0, 255, 0]);
        assert_eq!(px(&outcome.frame, 31, 21), vec![0, 255, 0]);
        assert_eq!(px(&outcome.frame, 10, 7), vec![128, 128, 128]);
        // The archived copy carries the same outlines
        let writes = writes.lock().unwrap();
        assert_eq!(px(&writes.artifacts[0], 2, 2), vec![0, 255, 0]);
    }

    #[test]
    fn test_output_is_in_display_order() {
        let mut data = vec![0u8; 8 * 8 * 3];
        for px in data.chunks_exact_mut(3) {
            px.copy_from_slice(&[255, 0, 0]); // blue, BGR
        }
        let (mut pipeline, _) = Fixture::default().build();

        let outcome = pipeline
            .run(Frame::new(data, 8, 8, 3, PixelOrder::Bgr, 0))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.frame.order(), PixelOrder::Rgb);
        assert_eq!(&outcome.frame.data()[..3], &[0, 0, 255]);
    }

    #[test]
    fn test_path_input_is_decoded_through_reader() {
        let (mut pipeline, writes) = Fixture {
            regions: vec![plate_region()],
            texts: vec![vec!["KR12345"]],
            ..Default::default()
        }
        .build();

        let outcome = pipeline.run(PathBuf::from("car.jpg")).unwrap().unwrap();

        assert_eq!(outcome.plate_text.as_deref(), Some("KR12345"));
        assert_eq!(writes.lock().unwrap().reads, 1);
    }

    #[test]
    fn test_detector_failure_propagates() {
        let (mut pipeline, writes) = Fixture {
            detector_fails: true,
            ..Default::default()
        }
        .build();

        let err = pipeline.run(gray_frame(64, 48)).unwrap_err();

        assert!(err.to_string().contains("detector crashed"));
        assert!(writes.lock().unwrap().events.is_empty());
    }
}
