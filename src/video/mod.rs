pub mod encoder;
pub mod frame;
mod generator;
pub mod overlay;

pub use encoder::{EncodeJob, Encoder, FfmpegEncoder};
pub use generator::{Compositor, Renderer};
