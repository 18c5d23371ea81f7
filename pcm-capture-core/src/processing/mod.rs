pub mod probe;
pub mod publisher;
pub mod wav_format;
