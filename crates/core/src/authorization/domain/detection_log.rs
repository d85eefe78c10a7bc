use crate::authorization::domain::detection_event::DetectionEvent;

/// Append-only sink for detection outcomes.
pub trait DetectionLog: Send {
    fn append(&self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error>>;
}
