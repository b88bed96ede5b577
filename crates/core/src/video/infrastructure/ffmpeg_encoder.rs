use std::path::Path;

use ffmpeg_next::codec::Id as CodecId;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::Rational;

use crate::shared::frame::{Frame, CHANNELS};
use crate::video::domain::video_encoder::{Container, EncoderSettings, VideoEncoder};

/// Target bitrate; libvpx and mpeg4 both default to a very low rate otherwise.
const BIT_RATE: usize = 4_000_000;

/// Encodes RGB frames into a WebM (VP8) or MP4 (MPEG-4) file via ffmpeg-next.
pub struct FfmpegEncoder {
    session: Option<Session>,
}

struct Session {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    time_base: Rational,
    next_pts: i64,
}

// Safety: an FfmpegEncoder is owned by exactly one thread at a time (the
// recorder moves it into the writer thread and back). The raw pointers
// inside the ffmpeg types are never shared.
unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self { session: None }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn find_codec(container: Container) -> Result<ffmpeg_next::Codec, Box<dyn std::error::Error>> {
    let found = match container {
        Container::WebM => ffmpeg_next::encoder::find(CodecId::VP8)
            .or_else(|| ffmpeg_next::encoder::find_by_name("libvpx")),
        Container::Mp4 => ffmpeg_next::encoder::find(CodecId::MPEG4),
    };
    found.ok_or_else(|| format!("No encoder available for .{} output", container.extension()).into())
}

fn integral_fps(fps: f64) -> i32 {
    let rounded = fps.round() as i32;
    if rounded <= 0 {
        30
    } else {
        rounded
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn open(
        &mut self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        if settings.width == 0 || settings.height == 0 {
            return Err(format!(
                "Invalid frame size {}x{}",
                settings.width, settings.height
            )
            .into());
        }

        let mut octx = ffmpeg_next::format::output(path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = find_codec(settings.container)?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        let fps = integral_fps(settings.fps);
        let time_base = Rational(1, fps);

        encoder_ctx.set_width(settings.width);
        encoder_ctx.set_height(settings.height);
        encoder_ctx.set_format(Pixel::YUV420P);
        encoder_ctx.set_time_base(time_base);
        encoder_ctx.set_frame_rate(Some(Rational(fps, 1)));
        encoder_ctx.set_bit_rate(BIT_RATE);

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        ost.set_time_base(time_base);

        octx.write_header()?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            settings.width,
            settings.height,
            Pixel::YUV420P,
            settings.width,
            settings.height,
            scaling::Flags::BILINEAR,
        )?;

        log::debug!(
            "Encoder opened: {} ({}x{} @ {fps} fps, {})",
            path.display(),
            settings.width,
            settings.height,
            codec.name()
        );

        self.session = Some(Session {
            octx,
            encoder,
            scaler,
            width: settings.width,
            height: settings.height,
            time_base,
            next_pts: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let session = self.session.as_mut().ok_or("FfmpegEncoder: not opened")?;

        if frame.dimensions() != (session.width, session.height) {
            return Err(format!(
                "Frame size {}x{} does not match encoder size {}x{}",
                frame.width(),
                frame.height(),
                session.width,
                session.height
            )
            .into());
        }

        let mut rgb_frame = VideoFrame::new(Pixel::RGB24, session.width, session.height);
        let stride = rgb_frame.stride(0);
        let row_bytes = session.width as usize * CHANNELS;
        let dst = rgb_frame.data_mut(0);
        for (row, src_row) in frame.data().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            dst[start..start + row_bytes].copy_from_slice(src_row);
        }

        let mut yuv_frame = VideoFrame::empty();
        session.scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(session.next_pts));
        session.next_pts += 1;

        session.encoder.send_frame(&yuv_frame)?;
        session.drain_packets()
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.encoder.send_eof()?;
        session.drain_packets()?;
        session.octx.write_trailer()?;
        Ok(())
    }
}

impl Session {
    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let ost_time_base = self
            .octx
            .stream(0)
            .ok_or("Output stream missing")?
            .time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(self.time_base, ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}
