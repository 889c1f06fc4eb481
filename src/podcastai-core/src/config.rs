//! Configuration module for loading TOML config files.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::audio::ExportFormat;
use crate::error::PodcastError;
use crate::speaker::{Cast, Persona, Speaker};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "podcastai.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Free-form editorial rules passed to both the outline and every turn.
    #[serde(default)]
    pub editorial_guidelines: String,
    #[serde(default = "default_model")]
    pub outline_model: String,
    #[serde(default = "default_model")]
    pub utterance_model: String,
    /// Retries on throttled or failed completion requests.
    #[serde(default = "default_max_retries")]
    pub completion_max_retries: u32,
    #[serde(default)]
    pub speakers: SpeakersConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

/// Persona templates for the two speakers.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakersConfig {
    #[serde(default = "default_host")]
    pub host: SpeakerConfig,
    #[serde(default = "default_cohost")]
    pub cohost: SpeakerConfig,
}

impl Default for SpeakersConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            cohost: default_cohost(),
        }
    }
}

/// A single speaker's name and system prompt template.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerConfig {
    pub name: String,
    pub prompt: String,
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// Vendor used when the CLI does not override it.
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Container of the full episode; clips are always WAV.
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries on throttling or server errors before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        default = "default_openai_voices",
        deserialize_with = "openai_over_defaults"
    )]
    pub openai: VendorConfig,
    #[serde(
        default = "default_elevenlabs_voices",
        deserialize_with = "elevenlabs_over_defaults"
    )]
    pub elevenlabs: VendorConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            sample_rate: default_sample_rate(),
            export_format: ExportFormat::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            openai: default_openai_voices(),
            elevenlabs: default_elevenlabs_voices(),
        }
    }
}

/// Per-vendor settings and voice-label mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorConfig {
    /// Vendor model id; each adapter has its own default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Voice id used for labels missing from `voices`.
    #[serde(default)]
    pub default_voice: Option<String>,
    /// Voice label (case-insensitive) to vendor voice id.
    #[serde(default)]
    pub voices: HashMap<String, String>,
}

impl VendorConfig {
    /// Lay `overrides` on top of `self`: set fields replace, voices are added
    /// to the existing map by lowercased label.
    pub fn merged(mut self, overrides: VendorConfig) -> Self {
        self.model = overrides.model.or(self.model);
        self.base_url = overrides.base_url.or(self.base_url);
        self.default_voice = overrides.default_voice.or(self.default_voice);
        self.voices = self
            .voices
            .into_iter()
            .chain(overrides.voices)
            .map(|(label, id)| (label.to_lowercase(), id))
            .collect();
        self
    }
}

fn openai_over_defaults<'de, D: Deserializer<'de>>(d: D) -> Result<VendorConfig, D::Error> {
    Ok(default_openai_voices().merged(VendorConfig::deserialize(d)?))
}

fn elevenlabs_over_defaults<'de, D: Deserializer<'de>>(d: D) -> Result<VendorConfig, D::Error> {
    Ok(default_elevenlabs_voices().merged(VendorConfig::deserialize(d)?))
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_service() -> String {
    "openai".to_string()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_host() -> SpeakerConfig {
    SpeakerConfig {
        name: "Ava".to_string(),
        prompt: DEFAULT_HOST_PROMPT.to_string(),
    }
}

fn default_cohost() -> SpeakerConfig {
    SpeakerConfig {
        name: "Marvin".to_string(),
        prompt: DEFAULT_COHOST_PROMPT.to_string(),
    }
}

fn default_openai_voices() -> VendorConfig {
    VendorConfig {
        model: Some("tts-1".to_string()),
        base_url: None,
        default_voice: Some("alloy".to_string()),
        voices: HashMap::from([
            ("ava".to_string(), "nova".to_string()),
            ("marvin".to_string(), "onyx".to_string()),
        ]),
    }
}

fn default_elevenlabs_voices() -> VendorConfig {
    VendorConfig {
        model: Some("eleven_monolingual_v1".to_string()),
        base_url: None,
        default_voice: Some("21m00Tcm4TlvDq8ikWAM".to_string()),
        voices: HashMap::from([
            ("ava".to_string(), "EXAVITQu4vr4xnSDxMaL".to_string()),
            ("marvin".to_string(), "pNInz6obpgDQGcFmaJgB".to_string()),
        ]),
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PodcastError::ConfigError(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load an explicitly named file, or `podcastai.toml` if present, or the
    /// built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PodcastError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(default_config()),
        }
    }

    fn speaker(&self, speaker: Speaker) -> &SpeakerConfig {
        match speaker {
            Speaker::Host => &self.speakers.host,
            Speaker::CoHost => &self.speakers.cohost,
        }
    }

    /// Get the persona for a speaker, with placeholders replaced.
    pub fn persona(&self, speaker: Speaker) -> Persona {
        let own = self.speaker(speaker);
        let other = self.speaker(speaker.other());

        let prompt = own
            .prompt
            .replace("{name}", &own.name)
            .replace("{other_name}", &other.name);

        Persona::new(own.name.clone(), prompt)
    }

    /// Both personas for an episode.
    pub fn cast(&self) -> Cast {
        Cast::new(self.persona(Speaker::Host), self.persona(Speaker::CoHost))
    }
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        editorial_guidelines: String::new(),
        outline_model: default_model(),
        utterance_model: default_model(),
        completion_max_retries: default_max_retries(),
        speakers: SpeakersConfig::default(),
        tts: TtsConfig::default(),
    }
}

const DEFAULT_HOST_PROMPT: &str = r#"You are {name}, an experienced, confident, and knowledgeable AI solutions architect.
- You are patient, empathetic, kind, non-judgmental, non-patronizing, and non-condescending.
- You guide the conversation and are aware of the plan.
- You try to explain things in a way that is easy to understand and not technical.
- When instructed, you must use {other_name}'s name in your second response to establish rapport.
- Keep your responses brief, ideally one or two sentences at most.
- Pause frequently to allow {other_name} to respond or ask questions.
"#;

const DEFAULT_COHOST_PROMPT: &str = r#"You are {name}, a business user who is not tech-savvy.
- You are the 'straight man' who asks questions to push {other_name} to explain things clearly.
- You insert humor when possible and are prone to dad jokes.
- You are not aware of the plan and are just along for the ride.
- Keep your responses brief, ideally one or two sentences at most.
- Ask short, focused questions to encourage {other_name} to explain further.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_personas() {
        let config = default_config();
        let cast = config.cast();
        assert_eq!(cast.name(Speaker::Host), "Ava");
        assert_eq!(cast.name(Speaker::CoHost), "Marvin");
        assert!(cast.persona(Speaker::Host).system_prompt.starts_with("You are Ava"));
        assert!(cast.persona(Speaker::Host).system_prompt.contains("Marvin's name"));
        assert!(!cast.persona(Speaker::CoHost).system_prompt.contains("{name}"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_str(
            r#"
editorial_guidelines = "Keep it light."

[tts.openai.voices]
ava = "shimmer"
"#,
        )
        .unwrap();

        assert_eq!(config.editorial_guidelines, "Keep it light.");
        assert_eq!(config.outline_model, "gpt-4o-mini");
        assert_eq!(config.tts.service, "openai");
        assert_eq!(config.tts.sample_rate, 24_000);
        assert_eq!(config.tts.export_format, ExportFormat::Mp3);
        assert_eq!(config.tts.openai.voices.get("ava").unwrap(), "shimmer");
        assert_eq!(config.speakers.cohost.name, "Marvin");
        assert_eq!(config.completion_max_retries, 3);
    }

    #[test]
    fn test_vendor_override_merges_with_builtin_voices() {
        let config = Config::from_str(
            r#"
[tts.openai]
model = "tts-1-hd"

[tts.openai.voices]
Ava = "shimmer"
"#,
        )
        .unwrap();

        let openai = &config.tts.openai;
        assert_eq!(openai.model.as_deref(), Some("tts-1-hd"));
        assert_eq!(openai.voices.get("ava").unwrap(), "shimmer");
        assert_eq!(openai.voices.get("marvin").unwrap(), "onyx");
        assert_eq!(openai.default_voice.as_deref(), Some("alloy"));
        assert_eq!(openai.voices.len(), 2);

        let voices = crate::tts::VoiceMap::new("openai", openai);
        assert_eq!(voices.resolve("Marvin").unwrap(), "onyx");
        assert_eq!(
            config.tts.elevenlabs.voices.get("marvin").unwrap(),
            "pNInz6obpgDQGcFmaJgB"
        );
    }

    #[test]
    fn test_custom_speaker_names_substituted() {
        let config = Config::from_str(
            r#"
[speakers.host]
name = "Iris"
prompt = "You are {name}. Talk to {other_name}."

[speakers.cohost]
name = "Otto"
prompt = "You are {name}."
"#,
        )
        .unwrap();

        let host = config.persona(Speaker::Host);
        assert_eq!(host.system_prompt, "You are Iris. Talk to Otto.");
        assert_eq!(config.persona(Speaker::CoHost).voice_label(), "Otto");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = Config::from_str("outline_model = [").unwrap_err();
        assert!(matches!(err, PodcastError::ConfigError(_)));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load_or_default(Some(Path::new("/nonexistent/podcastai.toml")))
            .unwrap_err();
        assert!(matches!(err, PodcastError::ConfigError(_)));
    }
}
