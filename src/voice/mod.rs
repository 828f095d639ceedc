//! Audio plumbing for the voice collaborators
//!
//! Capture, utterance segmentation, playback, and the hosted STT/TTS
//! backends.

mod capture;
mod playback;
mod segmenter;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3};
pub use segmenter::{SegmentState, UtteranceSegmenter, rms};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
