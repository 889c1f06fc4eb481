//! OpenAI speech endpoint.

use std::env;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::audio::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice};
use async_trait::async_trait;
use tracing::debug;

use super::{Synthesizer, VoiceMap, http_client, require_text, split_into_chunks};
use crate::audio::pcm16le_to_wav;
use crate::completion::DEFAULT_API_BASE;
use crate::config::TtsConfig;
use crate::error::PodcastError;

/// Raw `pcm` responses are always 24 kHz mono.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Input limit of the speech endpoint.
const MAX_INPUT_CHARS: usize = 4096;

const DEFAULT_MODEL: &str = "tts-1";

pub struct OpenAiTts {
    client: Client<OpenAIConfig>,
    model: String,
    voices: VoiceMap,
}

impl OpenAiTts {
    pub fn new(api_base: &str, api_key: &str, config: &TtsConfig) -> Result<Self, PodcastError> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client(config)?),
            model: config
                .openai
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voices: VoiceMap::new("openai", &config.openai),
        })
    }

    /// Uses `OPENAI_API_KEY`; the base URL comes from the config, then
    /// `OPENAI_API_BASE` / `OPENAI_BASE_URL`.
    pub fn from_env(config: &TtsConfig) -> Result<Self, PodcastError> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PodcastError::MissingCredential {
                var: "OPENAI_API_KEY".to_string(),
            })?;

        let api_base = config
            .openai
            .base_url
            .clone()
            .or_else(|| env::var("OPENAI_API_BASE").ok())
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Self::new(&api_base, &api_key, config)
    }

    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, PodcastError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Other(self.model.clone()))
            .voice(Voice::Other(voice_id.to_string()))
            .response_format(SpeechResponseFormat::Pcm)
            .build()?;

        let response = self.client.audio().speech().create(request).await?;
        Ok(response.bytes.to_vec())
    }
}

#[async_trait]
impl Synthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, PodcastError> {
        require_text(text)?;
        let voice_id = self.voices.resolve(voice)?;

        let mut pcm = Vec::new();
        for chunk in split_into_chunks(text, MAX_INPUT_CHARS) {
            debug!(voice_id, chars = chunk.len(), "requesting openai speech");
            pcm.extend(self.synthesize_chunk(&chunk, voice_id).await?);
        }

        if pcm.is_empty() {
            return Err(PodcastError::Tts("OpenAI returned no audio".to_string()));
        }

        pcm16le_to_wav(&pcm, PCM_SAMPLE_RATE)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
