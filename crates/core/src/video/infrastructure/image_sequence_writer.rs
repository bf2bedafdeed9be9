use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

/// Writes every output frame as `frame_000000.png`, `frame_000001.png`, ...
/// into a directory. Frames are resized when a fixed size is set.
pub struct ImageSequenceWriter {
    size: Option<(u32, u32)>,
    dir: Option<PathBuf>,
    written: usize,
}

impl ImageSequenceWriter {
    pub fn new(size: Option<(u32, u32)>) -> Self {
        Self {
            size,
            dir: None,
            written: 0,
        }
    }

    pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("frame_{index:06}.png"))
    }
}

impl VideoWriter for ImageSequenceWriter {
    fn open(
        &mut self,
        target: &Path,
        source: &VideoMetadata,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(target)?;
        self.dir = Some(target.to_path_buf());
        self.written = 0;
        let (width, height) = self.size.unwrap_or((source.width, source.height));
        Ok(VideoMetadata {
            codec: "png".to_string(),
            total_frames: 0,
            ..source.with_geometry(width, height, source.fps)
        })
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let dir = self.dir.as_ref().ok_or("ImageSequenceWriter: not opened")?;
        let out = match self.size {
            Some((w, h)) => frame.resized(w, h),
            None => frame.clone(),
        };
        image::save_buffer(
            Self::frame_path(dir, self.written),
            out.data(),
            out.width(),
            out.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = self.dir.take() {
            log::debug!("Wrote {} frames to {}", self.written, dir.display());
        }
        Ok(())
    }
}
