use std::path::{Path, PathBuf};

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::capture::error::CaptureError;
use crate::capture::frame_source::FrameSource;
use crate::shared::frame::{Frame, CHANNELS};
use crate::shared::video_metadata::VideoMetadata;

#[cfg(target_os = "linux")]
const CAMERA_BACKEND: &str = "v4l2";
#[cfg(target_os = "macos")]
const CAMERA_BACKEND: &str = "avfoundation";
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const CAMERA_BACKEND: &str = "dshow";

/// Decodes a video file, network stream or capture device via ffmpeg-next.
///
/// Frames are converted to RGB24 one at a time as `read` is called, so a
/// live camera is never buffered ahead of the capture loop.
pub struct FfmpegCapture {
    ictx: Option<ffmpeg_next::format::context::Input>,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<scaling::Context>,
    metadata: VideoMetadata,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
}

// Safety: FfmpegCapture is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCapture {}

impl FfmpegCapture {
    /// Opens a video file or stream URL. Paths naming a capture device
    /// (`/dev/videoN`) are routed through the platform camera backend.
    pub fn open_file(path: &Path) -> Result<Self, CaptureError> {
        if let Some(index) = device_index(path) {
            return Self::open_device(path, index);
        }
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path).map_err(|source| CaptureError::OpenStream {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_input(ictx, path)
    }

    /// Opens camera number `index` (e.g. `/dev/video{index}` on Linux).
    pub fn open_camera(index: u32) -> Result<Self, CaptureError> {
        Self::open_device(&camera_device_path(index), index)
    }

    fn open_device(device: &Path, index: u32) -> Result<Self, CaptureError> {
        ffmpeg_next::init()?;

        let backend = ffmpeg_next::device::input::video()
            .find(|format| format.name().split(',').any(|name| name == CAMERA_BACKEND))
            .ok_or_else(|| CaptureError::Camera {
                index,
                reason: format!("capture backend '{CAMERA_BACKEND}' not available"),
            })?;

        let ctx = ffmpeg_next::format::open_with(
            device,
            &ffmpeg_next::format::format::Format::Input(backend),
            ffmpeg_next::Dictionary::new(),
        )
        .map_err(|e| CaptureError::Camera {
            index,
            reason: e.to_string(),
        })?;

        match ctx {
            ffmpeg_next::format::context::Context::Input(ictx) => Self::from_input(ictx, device),
            ffmpeg_next::format::context::Context::Output(_) => Err(CaptureError::Camera {
                index,
                reason: "device opened as an output".to_string(),
            }),
        }
    }

    fn from_input(
        ictx: ffmpeg_next::format::context::Input,
        path: &Path,
    ) -> Result<Self, CaptureError> {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::NoVideoStream(path.to_path_buf()))?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let fps = [stream.rate(), stream.avg_frame_rate()]
            .into_iter()
            .find(|r| r.numerator() > 0 && r.denominator() > 0)
            .map(|r| r.numerator() as f64 / r.denominator() as f64)
            .unwrap_or(0.0);

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: usize::try_from(stream.frames()).ok().filter(|&n| n > 0),
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        log::info!(
            "Opened {} ({}x{} @ {:.2} fps, {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );

        Ok(Self {
            ictx: Some(ictx),
            decoder,
            scaler: None,
            metadata,
            video_stream_index,
            frame_index: 0,
            flushing: false,
        })
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = VideoFrame::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        // Built lazily: some devices only report their pixel format once
        // the first frame has been decoded.
        if self.scaler.is_none() {
            self.scaler = Some(scaling::Context::get(
                decoded.format(),
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )?);
        }
        let scaler = self.scaler.as_mut().ok_or("scaler not initialized")?;

        let mut rgb_frame = VideoFrame::empty();
        scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FfmpegCapture {
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.ictx.is_none() {
            return Err("FfmpegCapture: closed".into());
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            return Ok(None);
        }

        loop {
            let Some(ictx) = self.ictx.as_mut() else {
                return Ok(None);
            };
            let Some((stream, packet)) = ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                return self.try_receive();
            };

            if stream.index() != self.video_stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn is_opened(&self) -> bool {
        self.ictx.is_some()
    }

    fn frame_rate(&self) -> f64 {
        self.metadata.fps
    }

    fn frame_dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    fn frame_count(&self) -> Option<usize> {
        self.metadata.total_frames
    }

    fn close(&mut self) {
        self.ictx = None;
        self.scaler = None;
    }
}

fn camera_device_path(index: u32) -> PathBuf {
    if cfg!(target_os = "linux") {
        PathBuf::from(format!("/dev/video{index}"))
    } else if cfg!(target_os = "macos") {
        PathBuf::from(index.to_string())
    } else {
        PathBuf::from(format!("video={index}"))
    }
}

/// Recognizes `/dev/videoN` paths so they can be opened as cameras.
fn device_index(path: &Path) -> Option<u32> {
    path.to_str()?.strip_prefix("/dev/video")?.parse().ok()
}

/// Copies pixel data into a tightly packed buffer, dropping row padding
/// (ffmpeg strides may exceed `width * 3`).
fn extract_rgb_pixels(rgb_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * CHANNELS;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}
