pub const PLATE_MODEL_NAME: &str = "yolo_license_plate.onnx";
pub const OCR_MODEL_NAME: &str = "plate_ocr_crnn.onnx";
pub const OCR_DICTIONARY_NAME: &str = "latin_pl_dict.txt";

/// Minimum gap between full recognition passes on a stream.
pub const DEFAULT_THROTTLE_SECS: f64 = 3.0;

/// Plate detector score cutoff and NMS overlap limit.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;
pub const DEFAULT_NMS_IOU: f64 = 0.45;

pub const DEFAULT_DATABASE_PATH: &str = "license_plates.db";
pub const DEFAULT_DETECTIONS_DIR: &str = "detections";

pub const COMMENT_GRANTED: &str = "plate recognized, access granted";
pub const COMMENT_DENIED: &str = "plate not recognized, access denied";
pub const COMMENT_STORE_ERROR: &str = "error while checking the store";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
