use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::shared::frame::Frame;

/// Persists annotated frames for recognized plates.
pub trait DetectionArchive: Send {
    /// Stores `frame` under a name derived from `taken_at` and returns the
    /// path written. Names never collide with earlier artifacts.
    fn store(
        &self,
        frame: &Frame,
        taken_at: DateTime<Local>,
    ) -> Result<PathBuf, Box<dyn std::error::Error>>;
}
