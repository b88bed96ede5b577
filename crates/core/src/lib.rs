//! Object detection over camera, video and image sources, with annotated
//! output shown on screen and recorded to disk by a background writer.

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod video_metadata;
}

pub mod capture {
    pub mod error;
    pub mod frame_source;
    pub mod infrastructure;
    pub mod media_source;
}

pub mod detection {
    pub mod domain {
        pub mod class_labels;
        pub mod detection;
        pub mod object_detector;
    }
    pub mod error;
    pub mod infrastructure;
}

pub mod annotation {
    pub mod domain {
        pub mod frame_annotator;
    }
    pub mod infrastructure;
}

pub mod display {
    pub mod domain {
        pub mod display_sink;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod image_writer;
        pub mod video_encoder;
    }
    pub mod infrastructure;
}

pub mod recording {
    pub mod background_video_writer;
    pub mod error;
    pub mod frame_buffer;
    pub mod output_file;
    pub mod unique_name;
    pub mod writer_task;
}

pub mod pipeline {
    pub mod detect_image_use_case;
    pub mod detect_stream_use_case;
    pub mod pipeline_logger;
}
