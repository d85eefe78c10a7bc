use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::pipeline::plate_pipeline::{DetectionOutcome, PipelineError, PlatePipeline};
use crate::shared::constants::DEFAULT_THROTTLE_SECS;
use crate::video::domain::frame_source::{FrameSource, OpenSource, SourceSpec};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("cannot open {spec}: {reason}")]
    Open { spec: SourceSpec, reason: String },
    #[error("stream stopped by model failure: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("stream runner state poisoned by an earlier panic")]
    Poisoned,
}

/// Clears the running flag of a [`StreamRunner`] from any thread.
#[derive(Clone, Debug)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Asks the read loop to end. Observed before the next frame is read;
    /// a read already in progress is not interrupted.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("Stream stop requested");
        }
    }
}

/// Applies a [`PlatePipeline`] to a camera or video stream, at most once
/// per throttle window, and hands every frame to a callback.
///
/// `start` blocks the calling thread until the stream ends; run it on a
/// worker thread and call [`StreamRunner::stop`] (or a [`StopHandle`])
/// from elsewhere. The frame source is released whenever the loop ends.
pub struct StreamRunner {
    pipeline: Mutex<PlatePipeline>,
    source: Mutex<Box<dyn FrameSource>>,
    running: Arc<AtomicBool>,
    throttle: Duration,
}

impl StreamRunner {
    pub fn new(pipeline: PlatePipeline, source: Box<dyn FrameSource>) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
            source: Mutex::new(source),
            running: Arc::new(AtomicBool::new(false)),
            throttle: Duration::from_secs_f64(DEFAULT_THROTTLE_SECS),
        }
    }

    /// Minimum time after a successful recognition before the pipeline runs
    /// again.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// No-op when the runner is idle.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Opens `spec` and runs the read loop until the source is exhausted, a
    /// read fails, [`stop`](Self::stop) is called, or the pipeline reports
    /// a model failure (returned as the error).
    ///
    /// Calling `start` while another call is running returns immediately
    /// without touching the source.
    pub fn start<F>(&self, spec: &SourceSpec, mut on_frame: F) -> Result<(), StreamError>
    where
        F: FnMut(DetectionOutcome),
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Stream already running; ignoring start of {spec}");
            return Ok(());
        }
        let _running = RunningGuard(&self.running);

        let mut source = self.source.lock().map_err(|_| StreamError::Poisoned)?;
        let mut pipeline = self.pipeline.lock().map_err(|_| StreamError::Poisoned)?;
        let mut opened =
            OpenSource::open(&mut **source, spec).map_err(|e| StreamError::Open {
                spec: spec.clone(),
                reason: e.to_string(),
            })?;
        log::info!(
            "Streaming {spec} ({}x{}), recognition at most every {:.1}s",
            opened.info().width,
            opened.info().height,
            self.throttle.as_secs_f64()
        );

        let mut last_detection: Option<Instant> = None;
        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                log::info!("Stream {spec} stopped");
                break Ok(());
            }
            let frame = match opened.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("Stream {spec} exhausted");
                    break Ok(());
                }
                Err(e) => {
                    log::warn!("Reading {spec} failed, ending stream: {e}");
                    break Ok(());
                }
            };
            pipeline.logger_mut().frame(frame.index());

            let now = Instant::now();
            let due = last_detection.map_or(true, |at| now.duration_since(at) > self.throttle);
            if !due {
                on_frame(DetectionOutcome::passthrough(frame));
                continue;
            }

            let raw = frame.clone();
            match pipeline.run(frame) {
                Ok(Some(outcome)) => {
                    if outcome.plate_text.as_deref().is_some_and(|p| !p.is_empty()) {
                        last_detection = Some(now);
                    }
                    on_frame(outcome);
                }
                Ok(None) => on_frame(DetectionOutcome::passthrough(raw)),
                Err(e) => {
                    log::error!("Plate pipeline failed on {spec}: {e}");
                    break Err(StreamError::Pipeline(e));
                }
            }
        };

        drop(opened);
        pipeline.summary();
        result
    }
}

/// Resets the running flag however `start` returns.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
