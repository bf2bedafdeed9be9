use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageBuffer, Rgb, RgbImage};
use ndarray::ArrayView3;

/// A single captured frame: tightly packed RGB24 bytes in row-major order.
///
/// `index` is the position in the capture stream, counted from zero.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

const CHANNELS: usize = 3;

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
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

    pub fn index(&self) -> usize {
        self.index
    }

    /// `[height, width, channel]` view used by detector preprocessing.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Lends the pixel buffer out as an owned `RgbImage` for drawing, without
    /// copying. Returns false (and draws nothing) if the buffer is short.
    pub fn edit_image<F: FnOnce(&mut RgbImage)>(&mut self, draw: F) -> bool {
        let expected = (self.width as usize) * (self.height as usize) * CHANNELS;
        if self.data.len() != expected {
            return false;
        }
        let data = std::mem::take(&mut self.data);
        if let Some(mut img) = RgbImage::from_raw(self.width, self.height, data) {
            draw(&mut img);
            self.data = img.into_raw();
            return true;
        }
        false
    }

    /// JPEG-encodes the frame for hand-off to the resolver.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)?;
        Ok(out)
    }

    /// Returns a copy scaled to exactly `width` x `height`, keeping the index.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let src: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
                .expect("Frame data length must match dimensions");
        let scaled = image::imageops::resize(&src, width, height, FilterType::Triangle);
        Frame::new(scaled.into_raw(), width, height, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height) as usize * 3)
            .collect();
        Frame::new(data, width, height, 4)
    }

    #[test]
    fn test_construction_and_accessors() {
        let frame = solid(2, 2, [1, 2, 3]);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index(), 4);
        assert_eq!(&frame.data()[..3], &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 3")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 0);
    }

    #[test]
    fn test_as_ndarray_is_row_major_hwc() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, R
        let frame = Frame::new(data, 2, 2, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[0, 0, 0]], 0);
    }

    #[test]
    fn test_edit_image_writes_through() {
        let mut frame = solid(3, 2, [0, 0, 0]);
        assert!(frame.edit_image(|img| img.put_pixel(2, 1, Rgb([9, 8, 7]))));
        let offset = (3 + 2) * 3;
        assert_eq!(&frame.data()[offset..offset + 3], &[9, 8, 7]);
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_header() {
        let frame = solid(16, 16, [200, 100, 50]);
        let bytes = frame.encode_jpeg(90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_jpeg_decodes_to_same_size() {
        let frame = solid(24, 10, [10, 20, 30]);
        let bytes = frame.encode_jpeg(90).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (24, 10));
    }

    #[test]
    fn test_resized_changes_dimensions_and_keeps_index() {
        let frame = solid(40, 20, [128, 128, 128]);
        let out = frame.resized(99, 54);
        assert_eq!((out.width(), out.height()), (99, 54));
        assert_eq!(out.index(), 4);
        assert_eq!(out.data().len(), 99 * 54 * 3);
        assert_eq!(&out.data()[..3], &[128, 128, 128]);
    }

    #[test]
    fn test_resized_same_size_is_identical() {
        let frame = solid(5, 5, [1, 2, 3]);
        let out = frame.resized(5, 5);
        assert_eq!(out.data(), frame.data());
    }
}
