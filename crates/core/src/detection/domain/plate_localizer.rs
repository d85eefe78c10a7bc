use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for finding candidate plate areas in a frame.
///
/// Regions come back in detector order with no ranking guarantee. An empty
/// vector means "no plates found"; `Err` means the detector could not
/// process the frame at all.
pub trait PlateLocalizer: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
