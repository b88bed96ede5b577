use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;

use crate::recording::output_file::create_output;
use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

const JPEG_QUALITY: u8 = 95;

/// Writes annotated still images using the `image` crate.
///
/// JPEG output uses a fixed high quality; every other extension goes
/// through `image`'s format detection. An existing file is never
/// overwritten, and failing to create the file is a `RecorderError`.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let format = ImageFormat::from_path(path)?;
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;

        let mut out = BufWriter::new(create_output(path)?);
        match format {
            ImageFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&img)?;
            }
            _ => img.write_to(&mut out, format)?,
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::error::RecorderError;

    #[test]
    fn test_write_jpeg_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captures").join("out.jpg");
        let frame = Frame::filled(64, 48, [200, 30, 30], 0);

        ImageFileWriter::new().write(&path, &frame).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (64, 48));
        // JPEG is lossy; a flat color survives closely.
        let px = img.get_pixel(32, 24).0;
        assert!((px[0] as i32 - 200).abs() < 10, "red channel was {}", px[0]);
    }

    #[test]
    fn test_png_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let frame = Frame::filled(8, 8, [50, 100, 200], 0);

        ImageFileWriter::new().write(&path, &frame).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [50, 100, 200]);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        std::fs::write(&path, b"keep").unwrap();

        let err = ImageFileWriter::new()
            .write(&path, &Frame::filled(4, 4, [0, 0, 0], 0))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RecorderError>(),
            Some(RecorderError::PathExists(p)) if *p == path
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_uncreatable_directory_is_recorder_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("captures");
        std::fs::write(&blocker, b"").unwrap();

        let err = ImageFileWriter::new()
            .write(&blocker.join("out.jpg"), &Frame::filled(4, 4, [0, 0, 0], 0))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RecorderError>(),
            Some(RecorderError::CreateDir { .. })
        ));
    }

    #[test]
    fn test_unknown_extension_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::filled(4, 4, [0, 0, 0], 0);
        assert!(ImageFileWriter::new()
            .write(&dir.path().join("out.nope"), &frame)
            .is_err());
    }
}
