//! Audio assembly.
//!
//! Walks parsed segments in order, synthesizes every utterance to its own
//! numbered WAV file, and concatenates clips and generated silence into one
//! track that is exported once at the end, as MP3 unless WAV is requested.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::audio::{AudioClip, ExportFormat};
use crate::error::PodcastError;
use crate::markup::Segment;
use crate::tts::Synthesizer;

/// Progress events emitted while assembling.
#[derive(Debug, Clone)]
pub enum AssemblyEvent {
    /// An utterance is about to be synthesized or loaded.
    SegmentStart {
        position: usize,
        total: usize,
        voice: String,
    },
    /// An utterance clip is on disk.
    ClipReady { path: PathBuf, seconds: f64 },
    PauseAdded { seconds: f64 },
    /// The final track was written.
    Exported { path: PathBuf, seconds: f64 },
}

/// Callback for assembly events.
pub type AssemblyCallback = Box<dyn Fn(AssemblyEvent) + Send + Sync>;

/// Builds `<output_dir>/<stem>_full_podcast.mp3` plus per-utterance clips.
pub struct AudioAssembler {
    output_dir: PathBuf,
    stem: String,
    sample_rate: u32,
    format: ExportFormat,
    callback: Option<AssemblyCallback>,
}

impl AudioAssembler {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
            sample_rate,
            format: ExportFormat::default(),
            callback: None,
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_callback(mut self, callback: AssemblyCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Clip path for the utterance at 1-based `position` in the script.
    pub fn clip_path(&self, position: usize, voice: &str) -> PathBuf {
        self.output_dir
            .join(format!("{:03}_{}.wav", position, sanitize_label(voice)))
    }

    /// Path of the concatenated track.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_full_podcast.{}", self.stem, self.format.extension()))
    }

    /// Synthesize every utterance, then export the full track.
    ///
    /// Any failure aborts before the final track is written.
    pub async fn assemble(
        &self,
        segments: &[Segment],
        synthesizer: &dyn Synthesizer,
    ) -> Result<PathBuf, PodcastError> {
        fs::create_dir_all(&self.output_dir)?;
        info!(
            service = synthesizer.name(),
            segments = segments.len(),
            dir = %self.output_dir.display(),
            "assembling podcast"
        );

        let total = segments.len();
        let mut track = AudioClip::empty(self.sample_rate);

        for (index, segment) in segments.iter().enumerate() {
            let position = index + 1;
            match segment {
                Segment::Utterance { voice, text } => {
                    self.emit(AssemblyEvent::SegmentStart {
                        position,
                        total,
                        voice: voice.clone(),
                    });

                    let wav = synthesizer.synthesize(text, voice).await?;
                    let path = self.clip_path(position, voice);
                    fs::write(&path, &wav)?;

                    let clip = AudioClip::from_wav_bytes(&wav)?;
                    debug!(path = %path.display(), seconds = clip.duration_seconds(), "clip written");
                    self.emit(AssemblyEvent::ClipReady {
                        path,
                        seconds: clip.duration_seconds(),
                    });
                    track.append(clip);
                }
                Segment::Pause { seconds } => self.add_pause(&mut track, *seconds),
            }
        }

        self.export(&track)
    }

    /// Rebuild the full track from clips already on disk.
    pub fn compile(&self, segments: &[Segment]) -> Result<PathBuf, PodcastError> {
        let total = segments.len();
        let mut track = AudioClip::empty(self.sample_rate);

        for (index, segment) in segments.iter().enumerate() {
            let position = index + 1;
            match segment {
                Segment::Utterance { voice, .. } => {
                    self.emit(AssemblyEvent::SegmentStart {
                        position,
                        total,
                        voice: voice.clone(),
                    });

                    let path = self.clip_path(position, voice);
                    if !path.exists() {
                        return Err(PodcastError::MissingClip(path));
                    }
                    let clip = AudioClip::from_wav_file(&path)?;
                    self.emit(AssemblyEvent::ClipReady {
                        path,
                        seconds: clip.duration_seconds(),
                    });
                    track.append(clip);
                }
                Segment::Pause { seconds } => self.add_pause(&mut track, *seconds),
            }
        }

        self.export(&track)
    }

    fn add_pause(&self, track: &mut AudioClip, seconds: f64) {
        track.append(AudioClip::silence(seconds, self.sample_rate));
        self.emit(AssemblyEvent::PauseAdded { seconds });
    }

    /// Write to a temporary file first so a partial track never carries the
    /// final name.
    fn export(&self, track: &AudioClip) -> Result<PathBuf, PodcastError> {
        let path = self.output_path();
        let partial = path.with_extension(format!("{}.partial", self.format.extension()));
        match self.format {
            ExportFormat::Mp3 => fs::write(&partial, track.to_mp3_bytes()?)?,
            ExportFormat::Wav => track.write_wav(&partial)?,
        }
        fs::rename(&partial, &path)?;

        let seconds = track.duration_seconds();
        info!(path = %path.display(), seconds, "podcast exported");
        self.emit(AssemblyEvent::Exported {
            path: path.clone(),
            seconds,
        });
        Ok(path)
    }

    fn emit(&self, event: AssemblyEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Keep voice labels usable as file name parts.
fn sanitize_label(label: &str) -> String {
    let sanitized: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    if sanitized.is_empty() {
        "voice".to_string()
    } else {
        sanitized
    }
}
