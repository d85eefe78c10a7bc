/// A candidate plate rectangle in frame pixel coordinates.
///
/// Corners are inclusive-exclusive: `x1 <= x < x2`, `y1 <= y < y2`. A
/// `Region` always satisfies `x1 < x2` and `y1 < y2` and lies inside the
/// frame it was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    /// Builds a region from (possibly out-of-bounds, fractional) corner
    /// coordinates, clipping to a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clipped(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Region> {
        let clamp = |v: f64, max: u32| -> u32 {
            if v.is_nan() {
                0
            } else {
                v.clamp(0.0, max as f64) as u32
            }
        };
        let region = Region {
            x1: clamp(x1.min(x2), frame_width),
            y1: clamp(y1.min(y2), frame_height),
            x2: clamp(x1.max(x2), frame_width),
            y2: clamp(y1.max(y2), frame_height),
        };
        (region.x1 < region.x2 && region.y1 < region.y2).then_some(region)
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}
