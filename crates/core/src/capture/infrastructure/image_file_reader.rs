use std::path::{Path, PathBuf};

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::capture::error::CaptureError;
use crate::capture::frame_source::FrameSource;
use crate::shared::frame::{Frame, CHANNELS};

/// Presents a still image as a frame source.
///
/// The image is decoded once at open time; every `read` yields the same
/// picture, so a display loop can keep showing it until the user quits.
/// Decoding goes through ffmpeg, which is considerably faster than the
/// pure-Rust `image` decoders on large JPEGs.
pub struct ImageFileReader {
    frame: Option<Frame>,
    path: PathBuf,
}

impl ImageFileReader {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        if !path.exists() {
            return Err(CaptureError::NotFound(path.to_path_buf()));
        }
        let frame = decode_image(path).map_err(|e| CaptureError::DecodeImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        log::info!(
            "Loaded image {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self {
            frame: Some(frame),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ImageFileReader {
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        match &self.frame {
            Some(frame) => Ok(Some(frame.clone())),
            None => Err("ImageFileReader: closed".into()),
        }
    }

    fn is_opened(&self) -> bool {
        self.frame.is_some()
    }

    fn frame_rate(&self) -> f64 {
        0.0
    }

    fn frame_dimensions(&self) -> (u32, u32) {
        self.frame.as_ref().map_or((0, 0), Frame::dimensions)
    }

    fn close(&mut self) {
        self.frame = None;
    }
}

fn decode_image(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;

    let mut ictx = ffmpeg_next::format::input(path)?;
    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No image data found")?;
    let stream_index = stream.index();

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let mut decoder = codec_ctx.decoder().video()?;

    let mut decoded = VideoFrame::empty();
    let mut got_frame = false;
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        if decoder.receive_frame(&mut decoded).is_ok() {
            got_frame = true;
            break;
        }
    }
    if !got_frame {
        // Some formats only release their single frame on flush.
        let _ = decoder.send_eof();
        if decoder.receive_frame(&mut decoded).is_err() {
            return Err("Failed to decode image".into());
        }
    }

    let (width, height) = (decoded.width(), decoded.height());
    let mut scaler = scaling::Context::get(
        decoded.format(),
        width,
        height,
        Pixel::RGB24,
        width,
        height,
        scaling::Flags::BILINEAR,
    )?;
    let mut rgb = VideoFrame::empty();
    scaler.run(&decoded, &mut rgb)?;

    let stride = rgb.stride(0);
    let row_bytes = width as usize * CHANNELS;
    let pixels = rgb
        .data(0)
        .chunks(stride)
        .take(height as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect();
    Ok(Frame::new(pixels, width, height, 0))
}
