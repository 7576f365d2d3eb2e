mod gemini;
mod pollinations;
mod tts;

pub use gemini::{GeminiClient, GeminiModel};
pub use pollinations::{ImageGenerator, PollinationsClient};
pub use tts::{GoogleTts, SpeechSynthesizer};
