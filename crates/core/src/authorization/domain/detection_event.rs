use std::path::PathBuf;

use chrono::{DateTime, Local};

/// Storage format of event timestamps.
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one frame in which at least one plate was read.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionEvent {
    pub timestamp: DateTime<Local>,
    pub plate: String,
    pub comment: String,
    /// Annotated frame written for this event, when the write succeeded.
    pub image_path: Option<PathBuf>,
}

impl DetectionEvent {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string()
    }
}
