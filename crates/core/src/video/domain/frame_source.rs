use std::fmt;
use std::path::PathBuf;

use crate::shared::frame::Frame;

/// Where a stream of frames comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Capture device by index (`/dev/video<N>` on Linux).
    Camera(u32),
    /// A decodable video container on disk.
    File(PathBuf),
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Camera(index) => write!(f, "camera #{index}"),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Properties reported by a source once opened.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Zero when the container does not advertise a rate.
    pub fps: f64,
    pub codec: String,
}

/// Sequential frame pull from a camera or video file.
///
/// Frames are handed out in source (BGR) order.
pub trait FrameSource: Send {
    fn open(&mut self, spec: &SourceSpec) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    /// Next frame, or `None` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the underlying handle. Safe to call when not open.
    fn close(&mut self);
}

/// An opened [`FrameSource`] that is closed when the guard goes out of
/// scope, whichever way the owning loop exits.
pub struct OpenSource<'a> {
    source: &'a mut dyn FrameSource,
    info: SourceInfo,
}

impl<'a> OpenSource<'a> {
    pub fn open(
        source: &'a mut dyn FrameSource,
        spec: &SourceSpec,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let info = match source.open(spec) {
            Ok(info) => info,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        Ok(Self { source, info })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        self.source.read_frame()
    }
}

impl Drop for OpenSource<'_> {
    fn drop(&mut self) {
        self.source.close();
        log::debug!("Frame source released");
    }
}
