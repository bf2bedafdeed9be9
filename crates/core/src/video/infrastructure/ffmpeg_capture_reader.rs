use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Live capture through libavdevice/libavformat.
///
/// With a backend list, each named input format (`v4l2`, `avfoundation`,
/// `dshow`, ...) is tried in order and the first that opens the source wins.
/// Without one ffmpeg probes the source itself, which also covers files and
/// network streams. Frames are converted to RGB24.
pub struct FfmpegCaptureReader {
    backends: Vec<String>,
    capture_size: Option<(u32, u32)>,
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    decoder: Option<ffmpeg_next::decoder::Video>,
    video_stream_index: usize,
}

// Safety: FfmpegCaptureReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCaptureReader {}

impl FfmpegCaptureReader {
    pub fn new(backends: Vec<String>, capture_size: Option<(u32, u32)>) -> Self {
        Self {
            backends,
            capture_size,
            input_ctx: None,
            decoder: None,
            video_stream_index: 0,
        }
    }

    fn capture_options(&self) -> ffmpeg_next::Dictionary<'static> {
        let mut options = ffmpeg_next::Dictionary::new();
        if let Some((w, h)) = self.capture_size {
            options.set("video_size", &format!("{w}x{h}"));
        }
        options
    }

    fn open_input(
        &self,
        source: &str,
    ) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
        if self.backends.is_empty() {
            log::debug!("Opening {source} with probed input format");
            return Ok(ffmpeg_next::format::input_with_dictionary(
                source,
                self.capture_options(),
            )?);
        }

        ffmpeg_next::device::register_all();
        let mut failures = Vec::new();
        for backend in &self.backends {
            let Some(format) =
                ffmpeg_next::device::input::video().find(|f| f.name() == backend.as_str())
            else {
                log::debug!("Capture backend {backend} is not built into ffmpeg");
                failures.push(format!("{backend}: unavailable"));
                continue;
            };
            match ffmpeg_next::format::open_with(source, &format, self.capture_options()) {
                Ok(ctx) if ctx.is_input() => {
                    log::debug!("Opened {source} via {backend}");
                    return Ok(ctx.input());
                }
                Ok(_) => failures.push(format!("{backend}: not an input")),
                Err(e) => {
                    log::debug!("Backend {backend} failed to open {source}: {e}");
                    failures.push(format!("{backend}: {e}"));
                }
            }
        }
        Err(format!("no capture backend could open {source} ({})", failures.join("; ")).into())
    }
}

impl Default for FfmpegCaptureReader {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl VideoReader for FfmpegCaptureReader {
    fn open(&mut self, source: &str) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = self.open_input(source)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.avg_frame_rate();
        let rate = if rate.denominator() != 0 && rate.numerator() != 0 {
            rate
        } else {
            stream.rate()
        };
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source: source.to_string(),
        };
        if let Some((w, h)) = self.capture_size {
            if (w, h) != (metadata.width, metadata.height) {
                log::info!(
                    "Requested {w}x{h} capture, source delivers {}x{}",
                    metadata.width,
                    metadata.height
                );
            }
        }

        self.video_stream_index = video_stream_index;
        self.decoder = Some(decoder);
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let (Some(ictx), Some(decoder)) = (self.input_ctx.as_mut(), self.decoder.as_mut()) else {
            return Box::new(std::iter::once(Err(
                "FfmpegCaptureReader: not opened".into()
            )));
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = match ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        ) {
            Ok(s) => s,
            Err(e) => return Box::new(std::iter::once(Err(e.into()))),
        };

        Box::new(CaptureFrameIter {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index: self.video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.decoder = None;
        self.input_ctx = None;
    }
}

/// Pulls one decoded frame per `next`; nothing is buffered ahead.
struct CaptureFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: &'a mut ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl CaptureFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(Box::new(e)));
        }
        let pixels = packed_rgb(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for CaptureFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(result) = self.try_receive() {
            return Some(result);
        }
        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }
            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Strips per-row stride padding into a tightly packed RGB buffer.
fn packed_rgb(rgb_frame: &ffmpeg_next::util::frame::video::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
