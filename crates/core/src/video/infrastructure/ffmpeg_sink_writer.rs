use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_pacer::FramePacer;
use crate::video::domain::video_writer::VideoWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Forced container/device format, e.g. `v4l2` for a loopback device.
    /// `None` guesses from the target name.
    pub format: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Sleep between frames to hold `fps` in real time.
    pub pace: bool,
}

/// Fixed-geometry output through libavformat: a file, a stream URL or a
/// virtual camera device.
///
/// Every frame is scaled to the configured size and converted in a single
/// swscale pass. The codec is the container's default (rawvideo for v4l2),
/// falling back to MPEG-4 when that encoder is not built in.
pub struct FfmpegSinkWriter {
    config: SinkConfig,
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    pixel_format: ffmpeg_next::format::Pixel,
    scaler: Option<(ffmpeg_next::software::scaling::Context, u32, u32)>,
    pacer: FramePacer,
    frame_count: i64,
}

// Safety: FfmpegSinkWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSinkWriter {}

impl FfmpegSinkWriter {
    pub fn new(config: SinkConfig) -> Self {
        let pacer = FramePacer::new(config.fps);
        Self {
            config,
            octx: None,
            encoder: None,
            pixel_format: ffmpeg_next::format::Pixel::YUV420P,
            scaler: None,
            pacer,
            frame_count: 0,
        }
    }

    fn time_base(&self) -> ffmpeg_next::Rational {
        ffmpeg_next::Rational(1, self.config.fps.max(1) as i32)
    }

    /// Scaler for the incoming frame size, rebuilt only when it changes.
    fn scaler_for(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<&mut ffmpeg_next::software::scaling::Context, ffmpeg_next::Error> {
        let stale = !matches!(&self.scaler, Some((_, w, h)) if (*w, *h) == (width, height));
        if stale {
            let ctx = ffmpeg_next::software::scaling::Context::get(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                self.pixel_format,
                self.config.width,
                self.config.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((ctx, width, height));
        }
        match self.scaler.as_mut() {
            Some((ctx, _, _)) => Ok(ctx),
            None => Err(ffmpeg_next::Error::Bug),
        }
    }

    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let time_base = self.time_base();
        let (Some(encoder), Some(octx)) = (self.encoder.as_mut(), self.octx.as_mut()) else {
            return Ok(());
        };
        let ost_time_base = octx.stream(0).ok_or("sink stream missing")?.time_base();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(time_base, ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

fn pick_pixel_format(codec: &ffmpeg_next::codec::Codec) -> ffmpeg_next::format::Pixel {
    let preferred = ffmpeg_next::format::Pixel::YUV420P;
    let supported: Option<Vec<ffmpeg_next::format::Pixel>> = codec
        .video()
        .ok()
        .and_then(|v| v.formats().map(|f| f.collect()));
    match supported {
        Some(formats) if !formats.is_empty() && !formats.contains(&preferred) => formats[0],
        _ => preferred,
    }
}

impl VideoWriter for FfmpegSinkWriter {
    fn open(
        &mut self,
        target: &Path,
        source: &VideoMetadata,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let mut octx = match &self.config.format {
            Some(format) => ffmpeg_next::format::output_as(target, format)?,
            None => ffmpeg_next::format::output(target)?,
        };

        let default_id = octx
            .format()
            .codec(target, ffmpeg_next::media::Type::Video);
        let codec = ffmpeg_next::encoder::find(default_id)
            .or_else(|| ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4))
            .ok_or("no usable video encoder for sink")?;
        self.pixel_format = pick_pixel_format(&codec);

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let mut ost = octx.add_stream(Some(codec))?;
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(self.config.width);
        encoder_ctx.set_height(self.config.height);
        encoder_ctx.set_format(self.pixel_format);
        encoder_ctx.set_time_base(self.time_base());
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(self.config.fps.max(1) as i32, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        log::info!(
            "Writing {}x{}@{} {} to {}",
            self.config.width,
            self.config.height,
            self.config.fps,
            codec.name(),
            target.display()
        );

        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = None;
        self.frame_count = 0;

        Ok(VideoMetadata {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps as f64,
            total_frames: 0,
            codec: codec.name().to_string(),
            source: source.source.clone(),
        })
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if self.encoder.is_none() {
            return Err("FfmpegSinkWriter: not opened".into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            frame.width(),
            frame.height(),
        );
        let stride = rgb_frame.stride(0);
        let row_len = frame.width() as usize * 3;
        let dst = rgb_frame.data_mut(0);
        for (row, src_row) in frame.data().chunks_exact(row_len).enumerate() {
            let start = row * stride;
            dst[start..start + row_len].copy_from_slice(src_row);
        }

        let mut out_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler_for(frame.width(), frame.height())?
            .run(&rgb_frame, &mut out_frame)?;
        out_frame.set_pts(Some(self.frame_count));

        if self.config.pace {
            self.pacer.sleep_until_next_frame();
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.send_frame(&out_frame)?;
        }
        self.drain_packets()?;
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.send_eof()?;
            self.drain_packets()?;
            if let Some(octx) = self.octx.as_mut() {
                octx.write_trailer()?;
            }
            log::debug!("Sink closed after {} frames", self.frame_count);
        }
        self.octx = None;
        self.encoder = None;
        self.scaler = None;
        Ok(())
    }
}
