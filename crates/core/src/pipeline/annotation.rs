use image::{ImageBuffer, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Green is the same triple in BGR and RGB order.
const BOX_COLOR: [u8; 3] = [0, 255, 0];
const BOX_THICKNESS: u32 = 2;

/// Draws a 2px green outline just inside `region` on `frame`.
pub fn draw_region(frame: &mut Frame, region: &Region) {
    if frame.channels() != 3 {
        log::warn!("Not annotating {}-channel frame", frame.channels());
        return;
    }
    let (width, height) = (frame.width(), frame.height());
    let Some(mut canvas) = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.data_mut())
    else {
        return;
    };

    for inset in 0..BOX_THICKNESS {
        let w = region.width().saturating_sub(2 * inset);
        let h = region.height().saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((region.x1 + inset) as i32, (region.y1 + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(&mut canvas, rect, Rgb(BOX_COLOR));
    }
}
