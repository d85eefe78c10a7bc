use ndarray::ArrayView3;

/// Channel order of a 3-channel frame.
///
/// Capture devices and decoders hand out `Bgr` (source order); presentation
/// layers expect `Rgb` (display order).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOrder {
    Bgr,
    Rgb,
}

/// A single still image or stream frame: contiguous interleaved bytes in
/// row-major order.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    order: PixelOrder,
    index: usize,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        order: PixelOrder,
        index: usize,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            order,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn order(&self) -> PixelOrder {
        self.order
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the frame in display (RGB) order, swapping the outer
    /// channels when the frame is still in source order.
    pub fn into_display_order(self) -> Frame {
        self.into_order(PixelOrder::Rgb)
    }

    pub fn into_order(mut self, order: PixelOrder) -> Frame {
        if self.order != order && self.channels == 3 {
            for px in self.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
        self.order = order;
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
