pub mod ffmpeg_encoder;
pub mod image_file_writer;
