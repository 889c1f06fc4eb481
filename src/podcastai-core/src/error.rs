//! Error types for the podcast pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Invalid topic file {}: {reason}", .path.display())]
    InvalidTopic { path: PathBuf, reason: String },

    #[error("Invalid script file {}: {reason}", .path.display())]
    InvalidScript { path: PathBuf, reason: String },

    #[error("Outline contained no numbered sections; cannot generate a script")]
    EmptyOutline,

    #[error("Script is empty; nothing to synthesize")]
    EmptyScript,

    #[error("Script contains no synthesizable content (no <speak> or <break> segments found)")]
    NoSynthesizableContent,

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("Unknown TTS service '{0}' (expected 'openai' or 'elevenlabs')")]
    UnknownService(String),

    #[error("No {service} voice mapped for '{voice}' and no default voice configured")]
    UnknownVoice { service: String, voice: String },

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),

    #[error("MP3 encoding error: {0}")]
    Encode(String),

    #[error("Missing audio clip {}: run `generate` first", .0.display())]
    MissingClip(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
