/// YOLO plate localizer using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, confidence filtering, NMS
/// and clipping of the surviving boxes to the frame.
use std::path::Path;

use crate::detection::domain::plate_localizer::PlateLocalizer;
use crate::shared::frame::{Frame, PixelOrder};
use crate::shared::region::Region;

use super::execution_provider::build_session;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// YOLO plate detector backed by an ONNX Runtime session.
pub struct OnnxYoloLocalizer {
    session: ort::session::Session,
    confidence: f64,
    nms_iou: f64,
    input_size: u32,
}

impl OnnxYoloLocalizer {
    /// Load a YOLO ONNX model exported with a single plate class (or
    /// several classes, in which case the best class score is used).
    ///
    /// The input resolution is read from the model's input shape (NCHW).
    pub fn new(
        model_path: &Path,
        confidence: f64,
        nms_iou: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!("Plate localizer loaded: input {input_size}px, confidence {confidence}");
        Ok(Self {
            session,
            confidence,
            nms_iou,
            input_size,
        })
    }
}

impl PlateLocalizer for OnnxYoloLocalizer {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.channels() != 3 || frame.width() == 0 || frame.height() == 0 {
            return Err(format!(
                "Plate localizer expects a non-empty 3-channel frame, got {}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels()
            )
            .into());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();

        // [1, features, detections] (ultralytics export) or [1, detections, features]
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 {
            return Err(format!("YOLO output has too few features: {num_feats}").into());
        }

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let feature = |det: usize, f: usize| -> f32 {
            if transposed {
                data[f * num_dets + det]
            } else {
                data[det * num_feats + f]
            }
        };

        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            // [cx, cy, w, h, class scores...]
            let conf = (4..num_feats)
                .map(|f| feature(i, f))
                .fold(f32::MIN, f32::max) as f64;
            if conf < self.confidence {
                continue;
            }

            let cx = feature(i, 0) as f64;
            let cy = feature(i, 1) as f64;
            let w = feature(i, 2) as f64;
            let h = feature(i, 3) as f64;

            raw_dets.push(RawDetection {
                x1: ((cx - w / 2.0) - pad_x as f64) / scale,
                y1: ((cy - h / 2.0) - pad_y as f64) / scale,
                x2: ((cx + w / 2.0) - pad_x as f64) / scale,
                y2: ((cy + h / 2.0) - pad_y as f64) / scale,
                confidence: conf,
            });
        }

        let kept = nms(&mut raw_dets, self.nms_iou);
        Ok(kept
            .iter()
            .filter_map(|d| Region::clipped(d.x1, d.y1, d.x2, d.y2, frame.width(), frame.height()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`, emitting RGB
/// channels regardless of the frame's pixel order.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let rgb_index: [usize; 3] = match frame.order() {
        PixelOrder::Rgb => [0, 1, 2],
        PixelOrder::Bgr => [2, 1, 0],
    };

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for (c, &src_c) in rgb_index.iter().enumerate() {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, src_c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDetection, b: &RawDetection) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}
