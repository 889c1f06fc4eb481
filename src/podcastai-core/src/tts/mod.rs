//! Text-to-speech backends.
//!
//! Every backend implements [`Synthesizer`] and returns a complete mono
//! 16-bit WAV buffer. Voice labels from the script (persona names) are
//! resolved to vendor voice ids through a [`VoiceMap`].

pub mod elevenlabs;
pub mod openai;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{TtsConfig, VendorConfig};
use crate::error::PodcastError;

pub use elevenlabs::ElevenLabsTts;
pub use openai::OpenAiTts;

/// Opaque speech capability: text and voice label in, WAV bytes out.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize non-empty `text` with the voice mapped from `voice`.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, PodcastError>;

    /// Service name, e.g. `"openai"`.
    fn name(&self) -> &str;
}

/// Case-insensitive voice label to vendor voice id mapping.
#[derive(Debug, Clone)]
pub struct VoiceMap {
    service: String,
    voices: HashMap<String, String>,
    default_voice: Option<String>,
}

impl VoiceMap {
    pub fn new(service: impl Into<String>, vendor: &VendorConfig) -> Self {
        Self {
            service: service.into(),
            voices: vendor
                .voices
                .iter()
                .map(|(label, id)| (label.to_lowercase(), id.clone()))
                .collect(),
            default_voice: vendor.default_voice.clone(),
        }
    }

    /// Vendor voice id for a label, falling back to the default voice.
    pub fn resolve(&self, label: &str) -> Result<&str, PodcastError> {
        if let Some(id) = self.voices.get(&label.to_lowercase()) {
            return Ok(id);
        }

        match &self.default_voice {
            Some(default) => {
                warn!(
                    service = %self.service,
                    voice = label,
                    default = %default,
                    "voice not mapped, using default"
                );
                Ok(default)
            }
            None => Err(PodcastError::UnknownVoice {
                service: self.service.clone(),
                voice: label.to_string(),
            }),
        }
    }
}

/// Names accepted by [`create_synthesizer`].
pub fn available_services() -> Vec<&'static str> {
    vec!["openai", "elevenlabs"]
}

/// Build the synthesizer for a service name, reading its credential from the
/// environment.
pub fn create_synthesizer(
    service: &str,
    config: &TtsConfig,
) -> Result<Box<dyn Synthesizer>, PodcastError> {
    match service.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiTts::from_env(config)?)),
        "elevenlabs" => Ok(Box::new(ElevenLabsTts::from_env(config)?)),
        other => Err(PodcastError::UnknownService(other.to_string())),
    }
}

pub(crate) fn http_client(config: &TtsConfig) -> Result<reqwest::Client, PodcastError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(30))
        .build()?)
}

pub(crate) fn require_text(text: &str) -> Result<(), PodcastError> {
    if text.trim().is_empty() {
        return Err(PodcastError::Tts("Cannot synthesize empty text".to_string()));
    }
    Ok(())
}

/// Split text into chunks no longer than `max_chars`, preferring sentence
/// boundaries, then commas, then whitespace.
pub(crate) fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let pieces: Vec<&str> = if sentence.chars().count() > max_chars {
            sentence.split_inclusive(',').collect()
        } else {
            vec![sentence]
        };

        for piece in pieces {
            for word in hard_wrap(piece.trim(), max_chars) {
                if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
                    chunks.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&word);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Pieces of at most `max_chars`, breaking on whitespace where possible.
fn hard_wrap(piece: &str, max_chars: usize) -> Vec<String> {
    if piece.chars().count() <= max_chars {
        return vec![piece.to_string()];
    }

    let mut out = Vec::new();
    let mut line = String::new();
    for word in piece.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            out.push(head);
        }
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > max_chars {
            out.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&word);
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}
