use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;

use crate::shared::frame::{Frame, PixelOrder};
use crate::shared::region::Region;

/// Crops `region` out of `frame` and turns it into a single-channel
/// intensity image (ITU-R BT.601 luma weights). `region` must lie inside
/// the frame.
pub(crate) fn crop_gray(frame: &Frame, region: &Region) -> GrayImage {
    let pixels = frame.as_ndarray();
    let (r, g, b) = match frame.order() {
        PixelOrder::Rgb => (0, 1, 2),
        PixelOrder::Bgr => (2, 1, 0),
    };
    GrayImage::from_fn(region.width(), region.height(), |x, y| {
        let row = (region.y1 + y) as usize;
        let col = (region.x1 + x) as usize;
        let luma = 0.299 * pixels[[row, col, r]] as f32
            + 0.587 * pixels[[row, col, g]] as f32
            + 0.114 * pixels[[row, col, b]] as f32;
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binarizes a plate crop for OCR.
///
/// 1. Global threshold chosen by Otsu's method (pixels above the level
///    become 255, the rest 0). A single-intensity crop has no split and
///    gets level 0, so any non-black crop turns fully white.
/// 2. Morphological closing with a 3×3 square to rejoin broken strokes.
pub fn preprocess(gray: &GrayImage) -> GrayImage {
    let binary = threshold(gray, binarization_level(gray), ThresholdType::Binary);
    close(&binary, Norm::LInf, 1)
}

fn binarization_level(gray: &GrayImage) -> u8 {
    let mut values = gray.pixels().map(|p| p.0[0]);
    let Some(first) = values.next() else {
        return 0;
    };
    if values.all(|v| v == first) {
        return 0;
    }
    otsu_level(gray)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from_fn(w: u32, h: u32, order: PixelOrder, f: impl Fn(u32, u32) -> [u8; 3]) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&f(x, y));
            }
        }
        Frame::new(data, w, h, 3, order, 0)
    }

    #[test]
    fn test_crop_gray_respects_region_and_size() {
        let frame = frame_from_fn(10, 8, PixelOrder::Bgr, |x, _| {
            if x >= 5 {
                [255, 255, 255]
            } else {
                [0, 0, 0]
            }
        });
        let region = Region { x1: 4, y1: 2, x2: 7, y2: 5 };
        let gray = crop_gray(&frame, &region);
        assert_eq!(gray.dimensions(), (3, 3));
        assert_eq!(gray.get_pixel(0, 0).0[0], 0);
        assert_eq!(gray.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_crop_gray_uses_pixel_order() {
        // Pure red: 0.299 * 255 ≈ 76
        let bgr = frame_from_fn(1, 1, PixelOrder::Bgr, |_, _| [0, 0, 255]);
        let rgb = frame_from_fn(1, 1, PixelOrder::Rgb, |_, _| [255, 0, 0]);
        let region = Region { x1: 0, y1: 0, x2: 1, y2: 1 };
        assert_eq!(crop_gray(&bgr, &region).get_pixel(0, 0).0[0], 76);
        assert_eq!(crop_gray(&rgb, &region).get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn test_preprocess_output_is_binary() {
        let gray = GrayImage::from_fn(20, 10, |x, y| image::Luma([((x * 13 + y * 7) % 256) as u8]));
        let out = preprocess(&gray);
        assert_eq!(out.dimensions(), gray.dimensions());
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_preprocess_picks_data_dependent_split() {
        // Bimodal 40/90 image: a fixed cut at 127 would make it all black
        let gray = GrayImage::from_fn(20, 20, |x, _| image::Luma([if x < 10 { 40 } else { 90 }]));
        let out = preprocess(&gray);
        assert_eq!(out.get_pixel(2, 10).0[0], 0);
        assert_eq!(out.get_pixel(17, 10).0[0], 255);
    }

    #[test]
    fn test_preprocess_closes_single_pixel_gap() {
        // White bar with a one-pixel dark hole in the middle
        let gray = GrayImage::from_fn(9, 9, |x, y| {
            if (2..7).contains(&y) && (1..8).contains(&x) && !(x == 4 && y == 4) {
                image::Luma([230])
            } else {
                image::Luma([20])
            }
        });
        let out = preprocess(&gray);
        assert_eq!(out.get_pixel(4, 4).0[0], 255);
    }

    #[test]
    fn test_uniform_crop_is_white_unless_black() {
        let bright = GrayImage::from_pixel(5, 5, image::Luma([200]));
        let dark = GrayImage::from_pixel(5, 5, image::Luma([100]));
        let faint = GrayImage::from_pixel(5, 5, image::Luma([1]));
        let black = GrayImage::from_pixel(5, 5, image::Luma([0]));
        assert!(preprocess(&bright).pixels().all(|p| p.0[0] == 255));
        assert!(preprocess(&dark).pixels().all(|p| p.0[0] == 255));
        assert!(preprocess(&faint).pixels().all(|p| p.0[0] == 255));
        assert!(preprocess(&black).pixels().all(|p| p.0[0] == 0));
    }


    #[test]
    fn test_preprocess_is_deterministic() {
        let gray = GrayImage::from_fn(16, 16, |x, y| image::Luma([((x * y) % 251) as u8]));
        assert_eq!(preprocess(&gray), preprocess(&gray));
    }
}
