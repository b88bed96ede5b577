pub mod headless_display;
#[cfg(feature = "opencv-display")]
pub mod opencv_display;
