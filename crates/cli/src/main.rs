use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;

use plategate_core::authorization::infrastructure::sqlite_plate_store::SqlitePlateStore;
use plategate_core::detection::infrastructure::onnx_yolo_localizer::OnnxYoloLocalizer;
use plategate_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use plategate_core::pipeline::plate_pipeline::PlatePipeline;
use plategate_core::pipeline::stream_runner::StreamRunner;
use plategate_core::recognition::domain::recognition_engine::RecognitionEngine;
use plategate_core::recognition::domain::text_recognizer::TextRecognizer;
use plategate_core::recognition::infrastructure::onnx_crnn_recognizer::OnnxCrnnRecognizer;
use plategate_core::shared::constants::{
    IMAGE_EXTENSIONS, OCR_DICTIONARY_NAME, OCR_MODEL_NAME, PLATE_MODEL_NAME,
};
use plategate_core::shared::model_resolver::{self, ModelLocation};
use plategate_core::shared::settings::Settings;
use plategate_core::video::domain::frame_source::SourceSpec;
use plategate_core::video::domain::image_writer::ImageWriter;
use plategate_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use plategate_core::video::infrastructure::image_file_reader::ImageFileReader;
use plategate_core::video::infrastructure::image_file_writer::ImageFileWriter;
use plategate_core::video::infrastructure::jpeg_detection_archive::JpegDetectionArchive;

/// License plate recognition and access control for images, videos and
/// cameras.
#[derive(Parser)]
#[command(name = "plategate")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize plates in a single image.
    Image {
        input: PathBuf,

        /// Write the annotated image here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recognize plates in a video file.
    Video {
        input: PathBuf,

        #[command(flatten)]
        stream: StreamArgs,
    },
    /// Recognize plates from a live camera.
    Camera {
        /// Capture device index.
        #[arg(long, default_value = "0")]
        index: u32,

        #[command(flatten)]
        stream: StreamArgs,
    },
}

#[derive(Args)]
struct StreamArgs {
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Seconds between recognitions after a plate was read.
    #[arg(long)]
    throttle: Option<f64>,
}

/// Flags that take precedence over the settings file.
#[derive(Args)]
struct Overrides {
    /// Settings file (default: <config dir>/PlateGate/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database with authorized_plates and detection_logs tables.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory for annotated detection images.
    #[arg(long, global = true)]
    detections_dir: Option<PathBuf>,

    /// Plate detector ONNX model.
    #[arg(long, global = true)]
    plate_model: Option<PathBuf>,

    /// Plate OCR ONNX model.
    #[arg(long, global = true)]
    ocr_model: Option<PathBuf>,

    /// OCR dictionary, one symbol per line.
    #[arg(long, global = true)]
    ocr_dictionary: Option<PathBuf>,

    /// Directory searched for model files before downloading.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Plate detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,
}

/// Messages from the stream worker to the main thread.
enum StreamUpdate {
    Plate { plate: String, comment: String },
    Finished(Result<(), String>),
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.overrides)?;

    match cli.command {
        Command::Image { input, output } => {
            validate_image_input(&input)?;
            run_image(&cli.overrides, &settings, &input, output.as_deref())
        }
        Command::Video { input, stream } => {
            if !input.exists() {
                return Err(format!("Input file not found: {}", input.display()).into());
            }
            run_stream(&cli.overrides, settings, SourceSpec::File(input), &stream)
        }
        Command::Camera { index, stream } => {
            run_stream(&cli.overrides, settings, SourceSpec::Camera(index), &stream)
        }
    }
}

fn run_image(
    overrides: &Overrides,
    settings: &Settings,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = build_pipeline(overrides, settings)?;
    let outcome = pipeline
        .run(input)?
        .ok_or_else(|| format!("Could not load image {}", input.display()))?;

    match (&outcome.plate_text, &outcome.comment) {
        (Some(plate), Some(comment)) => println!("{plate}: {comment}"),
        _ => println!("No plate recognized"),
    }
    let others = outcome
        .readings
        .iter()
        .filter(|r| Some(&r.plate) != outcome.plate_text.as_ref());
    for reading in others {
        log::info!(
            "Also read {} (raw {:?}, confidence {:.2})",
            reading.plate,
            reading.raw_text,
            reading.confidence
        );
    }

    if let Some(output) = output {
        ImageFileWriter::new().write(output, &outcome.frame)?;
        log::info!("Annotated image written to {}", output.display());
    }
    pipeline.summary();
    Ok(())
}

fn run_stream(
    overrides: &Overrides,
    mut settings: Settings,
    spec: SourceSpec,
    args: &StreamArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(throttle) = args.throttle {
        settings.throttle_secs = throttle;
        settings.validate()?;
    }
    let pipeline = build_pipeline(overrides, &settings)?;
    let runner = Arc::new(
        StreamRunner::new(pipeline, Box::new(FfmpegFrameSource::new()))
            .with_throttle(settings.throttle()),
    );

    let (tx, rx) = crossbeam_channel::unbounded::<StreamUpdate>();
    let worker = {
        let runner = runner.clone();
        let spec = spec.clone();
        thread::spawn(move || {
            let result = runner.start(&spec, |outcome| {
                if let (Some(plate), Some(comment)) = (outcome.plate_text, outcome.comment) {
                    let _ = tx.send(StreamUpdate::Plate { plate, comment });
                }
            });
            let _ = tx.send(StreamUpdate::Finished(result.map_err(|e| e.to_string())));
        })
    };

    let deadline = stream_deadline(Instant::now(), args.duration)?;
    let result = loop {
        let update = match deadline {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(update) => update,
                Err(RecvTimeoutError::Timeout) => {
                    log::info!("Duration elapsed, stopping {spec}");
                    runner.stop();
                    match rx.recv() {
                        Ok(update) => update,
                        Err(_) => break Err("stream worker exited unexpectedly".to_string()),
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err("stream worker exited unexpectedly".to_string())
                }
            },
            None => match rx.recv() {
                Ok(update) => update,
                Err(_) => break Err("stream worker exited unexpectedly".to_string()),
            },
        };
        match update {
            StreamUpdate::Plate { plate, comment } => println!("{plate}: {comment}"),
            StreamUpdate::Finished(result) => break result,
        }
    };

    runner.stop();
    if worker.join().is_err() {
        return Err("stream worker panicked".into());
    }
    result.map_err(Into::into)
}

fn load_settings(overrides: &Overrides) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &overrides.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    if let Some(path) = &overrides.database {
        settings.database_path = path.clone();
    }
    if let Some(dir) = &overrides.detections_dir {
        settings.detections_dir = dir.clone();
    }
    if let Some(path) = &overrides.plate_model {
        settings.plate_model = Some(path.clone());
    }
    if let Some(path) = &overrides.ocr_model {
        settings.ocr_model = Some(path.clone());
    }
    if let Some(path) = &overrides.ocr_dictionary {
        settings.ocr_dictionary = Some(path.clone());
    }
    if let Some(confidence) = overrides.confidence {
        settings.confidence = confidence;
    }
    settings.validate()?;
    Ok(settings)
}

fn build_pipeline(
    overrides: &Overrides,
    settings: &Settings,
) -> Result<PlatePipeline, Box<dyn std::error::Error>> {
    let models_dir = overrides.models_dir.as_deref();

    let plate_model = resolve_model(
        PLATE_MODEL_NAME,
        settings.plate_model.as_deref(),
        models_dir,
        settings.plate_model_url.as_deref(),
    )?;
    let localizer = OnnxYoloLocalizer::new(&plate_model, settings.confidence, settings.nms_iou)?;

    let ocr_model = resolve_model(
        OCR_MODEL_NAME,
        settings.ocr_model.as_deref(),
        models_dir,
        settings.ocr_model_url.as_deref(),
    )?;
    let recognizer: Box<dyn TextRecognizer> =
        if settings.ocr_dictionary.is_some() || settings.ocr_dictionary_url.is_some() {
            let dictionary = resolve_model(
                OCR_DICTIONARY_NAME,
                settings.ocr_dictionary.as_deref(),
                models_dir,
                settings.ocr_dictionary_url.as_deref(),
            )?;
            Box::new(OnnxCrnnRecognizer::from_dictionary_file(&ocr_model, &dictionary)?)
        } else {
            Box::new(OnnxCrnnRecognizer::with_latin_pl_charset(&ocr_model)?)
        };

    let archive =
        JpegDetectionArchive::new(&settings.detections_dir, Box::new(ImageFileWriter::new()))
            .map_err(|e| {
                format!(
                    "Cannot create detections directory {}: {e}",
                    settings.detections_dir.display()
                )
            })?;

    Ok(PlatePipeline::new(
        RecognitionEngine::new(Box::new(localizer), recognizer),
        Box::new(SqlitePlateStore::new(&settings.database_path)),
        Box::new(SqlitePlateStore::new(&settings.database_path)),
        Box::new(archive),
        Box::new(ImageFileReader::new()),
        Box::new(StdoutPipelineLogger::default()),
    ))
}

/// Converts `--duration` into a deadline. Durations too long to represent
/// on the clock mean "no deadline".
fn stream_deadline(now: Instant, duration: Option<f64>) -> Result<Option<Instant>, String> {
    let Some(secs) = duration else {
        return Ok(None);
    };
    let span = Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("--duration out of range: {secs}"))?;
    Ok(now.checked_add(span))
}

fn resolve_model(
    name: &'static str,
    explicit: Option<&Path>,
    bundled_dir: Option<&Path>,
    url: Option<&str>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {name}");
    let location = ModelLocation {
        name,
        explicit,
        bundled_dir,
        url,
    };
    let path = model_resolver::resolve(
        &location,
        Some(Box::new(move |downloaded, total| {
            download_progress(name, downloaded, total)
        })),
    )?;
    log::debug!("Using {name} at {}", path.display());
    Ok(path)
}

fn validate_image_input(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if !is_image(input) {
        log::warn!(
            "{} does not have a known image extension; trying to decode anyway",
            input.display()
        );
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
