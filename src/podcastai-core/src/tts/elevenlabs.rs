//! ElevenLabs text-to-speech over plain HTTP.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Synthesizer, VoiceMap, http_client, require_text, split_into_chunks};
use crate::audio::pcm16le_to_wav;
use crate::config::TtsConfig;
use crate::error::PodcastError;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_monolingual_v1";
const MAX_INPUT_CHARS: usize = 5000;

/// Raw PCM rates the vendor can return.
const PCM_RATES: [u32; 4] = [16_000, 22_050, 24_000, 44_100];

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    voices: VoiceMap,
    sample_rate: u32,
    max_retries: u32,
    retry_delay: Duration,
}

impl ElevenLabsTts {
    pub fn new(base_url: &str, api_key: &str, config: &TtsConfig) -> Result<Self, PodcastError> {
        Ok(Self {
            client: http_client(config)?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: config
                .elevenlabs
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voices: VoiceMap::new("elevenlabs", &config.elevenlabs),
            sample_rate: closest_pcm_rate(config.sample_rate),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Uses `ELEVENLABS_API_KEY`, or the older `ELEVEN_LABS_API_KEY`.
    pub fn from_env(config: &TtsConfig) -> Result<Self, PodcastError> {
        let api_key = env::var("ELEVENLABS_API_KEY")
            .or_else(|_| env::var("ELEVEN_LABS_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PodcastError::MissingCredential {
                var: "ELEVENLABS_API_KEY".to_string(),
            })?;

        let base_url = config
            .elevenlabs
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self::new(&base_url, &api_key, config)
    }

    /// Base delay before the first retry; doubled on each further attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, PodcastError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings::default(),
        };
        let output_format = format!("pcm_{}", self.sample_rate);

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .query(&[("output_format", output_format.as_str())])
                .header("xi-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.bytes().await?.to_vec());
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.max_retries {
                let delay = self.retry_delay * 2u32.pow(attempt);
                attempt += 1;
                warn!(%status, attempt, ?delay, "elevenlabs request failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            let detail = response.text().await.unwrap_or_default();
            return Err(PodcastError::Tts(format!(
                "ElevenLabs returned {}: {}",
                status,
                detail.trim()
            )));
        }
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, PodcastError> {
        require_text(text)?;
        let voice_id = self.voices.resolve(voice)?;

        let mut pcm = Vec::new();
        for chunk in split_into_chunks(text, MAX_INPUT_CHARS) {
            debug!(voice_id, chars = chunk.len(), "requesting elevenlabs speech");
            pcm.extend(self.synthesize_chunk(&chunk, voice_id).await?);
        }

        if pcm.is_empty() {
            return Err(PodcastError::Tts("ElevenLabs returned no audio".to_string()));
        }

        pcm16le_to_wav(&pcm, self.sample_rate)
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}

fn closest_pcm_rate(requested: u32) -> u32 {
    PCM_RATES
        .into_iter()
        .min_by_key(|rate| rate.abs_diff(requested))
        .unwrap_or(24_000)
}
