//! Parley - a half-duplex conversational voice assistant
//!
//! This library provides the building blocks of the assistant:
//! - A turn-taking pipeline of three concurrent stages
//! - Listener, conversation, and speaker collaborators behind async traits
//! - Audio capture, segmentation, playback, and hosted STT/TTS
//! - Layered configuration (defaults, TOML file, environment)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Collaborators                    │
//! │  Microphone/Keyboard  │  Chat model  │  Voice out   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Listen / Converse / Speak
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Pipeline                        │
//! │  Listener ─▶ inputs ─▶ Conversation ─▶ replies ─▶   │
//! │  Speaker ─▶ ReadyGate ─▶ Listener                   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use handlers::{Converse, Listen, Speak};
pub use pipeline::{Pipeline, PipelineBuilder, ReadyGate};
