use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::shared::frame::Frame;
use crate::video::domain::detection_archive::DetectionArchive;
use crate::video::domain::image_writer::ImageWriter;

const FILE_STEM_FORMAT: &str = "detection_%Y%m%d_%H%M%S";

/// Gives up after this many same-second collisions.
const MAX_SUFFIX: u32 = 10_000;

/// Writes one JPEG per detection into a fixed directory, named
/// `detection_YYYYMMDD_HHMMSS.jpg`. Further artifacts within the same
/// second get a `_1`, `_2`, ... suffix.
pub struct JpegDetectionArchive {
    dir: PathBuf,
    writer: Box<dyn ImageWriter>,
}

impl JpegDetectionArchive {
    /// Creates `dir` if it does not exist yet.
    pub fn new(
        dir: impl Into<PathBuf>,
        writer: Box<dyn ImageWriter>,
    ) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, writer })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claims a fresh file name by creating it exclusively, so concurrent
    /// archives sharing the directory never hand out the same path.
    fn reserve(&self, taken_at: DateTime<Local>) -> Result<PathBuf, std::io::Error> {
        let stem = taken_at.format(FILE_STEM_FORMAT).to_string();
        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                format!("{stem}.jpg")
            } else {
                format!("{stem}_{n}.jpg")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free artifact name for {stem}"),
        ))
    }
}

impl DetectionArchive for JpegDetectionArchive {
    fn store(
        &self,
        frame: &Frame,
        taken_at: DateTime<Local>,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.reserve(taken_at)?;
        if let Err(e) = self.writer.write(&path, frame) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        log::debug!("Saved detection artifact {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::PixelOrder;
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use chrono::TimeZone;

    fn frame() -> Frame {
        Frame::new(vec![0, 255, 0].repeat(16 * 8), 16, 8, 3, PixelOrder::Bgr, 0)
    }

    fn moment() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_new_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("detections");
        let archive = JpegDetectionArchive::new(&dir, Box::new(ImageFileWriter::new())).unwrap();
        assert!(dir.is_dir());
        assert_eq!(archive.dir(), dir.as_path());
    }

    #[test]
    fn test_store_uses_timestamp_name() {
        let tmp = tempfile::tempdir().unwrap();
        let archive =
            JpegDetectionArchive::new(tmp.path(), Box::new(ImageFileWriter::new())).unwrap();

        let path = archive.store(&frame(), moment()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "detection_20240309_140507.jpg"
        );
        assert_eq!(image::open(&path).unwrap().width(), 16);
    }

    #[test]
    fn test_same_second_gets_unique_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let archive =
            JpegDetectionArchive::new(tmp.path(), Box::new(ImageFileWriter::new())).unwrap();

        let names: Vec<String> = (0..3)
            .map(|_| {
                let path = archive.store(&frame(), moment()).unwrap();
                path.file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "detection_20240309_140507.jpg",
                "detection_20240309_140507_1.jpg",
                "detection_20240309_140507_2.jpg",
            ]
        );
    }

    struct FailingWriter;

    impl ImageWriter for FailingWriter {
        fn write(&self, _path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("disk full".into())
        }
    }

    #[test]
    fn test_failed_write_leaves_no_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = JpegDetectionArchive::new(tmp.path(), Box::new(FailingWriter)).unwrap();

        assert!(archive.store(&frame(), moment()).is_err());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
