use crate::shared::frame::{Frame, PixelOrder};
use crate::video::domain::frame_source::{FrameSource, SourceInfo, SourceSpec};

/// Pulls frames from a video file or capture device via ffmpeg-next
/// (libavformat + libavdevice + libavcodec).
///
/// Every decoded frame is converted to BGR24, the source order the rest of
/// the pipeline expects from a live feed.
pub struct FfmpegFrameSource {
    decoding: Option<Decoding>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

struct Decoding {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    stream_index: usize,
    frame_index: usize,
    eof_sent: bool,
}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self { decoding: None }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, spec: &SourceSpec) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        self.close();

        let ictx = match spec {
            SourceSpec::File(path) => ffmpeg_next::format::input(path)?,
            SourceSpec::Camera(index) => open_camera(*index)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(format!("{spec}: stream reports no frame size").into());
        }

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let info = SourceInfo {
            width,
            height,
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
        };

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!("Opened {spec}: {width}x{height} @ {fps:.1} fps ({})", info.codec);
        self.decoding = Some(Decoding {
            ictx,
            decoder,
            scaler,
            width,
            height,
            stream_index,
            frame_index: 0,
            eof_sent: false,
        });
        Ok(info)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(decoding) = self.decoding.as_mut() else {
            return Err("FfmpegFrameSource: not opened".into());
        };
        decoding.next_frame()
    }

    fn close(&mut self) {
        self.decoding = None;
    }
}

impl Decoding {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.eof_sent = true;
                continue;
            };
            if stream.index() != self.stream_index {
                continue;
            }
            // Corrupt packets are skipped; live devices emit them on startup
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut bgr_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut bgr_frame)?;

        let pixels = packed_pixels(&bgr_frame, self.width, self.height);
        let frame = Frame::new(
            pixels,
            self.width,
            self.height,
            3,
            PixelOrder::Bgr,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Opens capture device `index` through the platform's libavdevice input.
fn open_camera(
    index: u32,
) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
    ffmpeg_next::device::register_all();

    let (format_name, url) = camera_url(index);
    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name().split(',').any(|name| name == format_name))
        .ok_or_else(|| format!("Capture backend '{format_name}' is not available"))?;

    let ctx = ffmpeg_next::format::open_with(
        &url,
        &format,
        ffmpeg_next::Dictionary::new(),
    )
    .map_err(|e| format!("Cannot open camera #{index} ({url}): {e}"))?;

    match ctx {
        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
        ffmpeg_next::format::context::Context::Output(_) => {
            Err(format!("Camera #{index} did not open as an input").into())
        }
    }
}

/// libavdevice demuxer name and device URL for a camera index.
fn camera_url(index: u32) -> (&'static str, String) {
    if cfg!(target_os = "macos") {
        ("avfoundation", format!("{index}:none"))
    } else if cfg!(target_os = "windows") {
        ("vfwcap", index.to_string())
    } else {
        ("v4l2", format!("/dev/video{index}"))
    }
}

/// Copies a possibly row-padded ffmpeg frame into a tightly packed buffer.
fn packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
