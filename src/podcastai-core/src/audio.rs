//! In-memory audio clips.
//!
//! Every clip is mono signed 16-bit PCM. Synthesizers hand back WAV bytes,
//! which are decoded here, down-mixed and resampled to the track rate. The
//! finished track is exported as MP3 (or WAV when asked).

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use mp3lame_encoder::{Builder, FlushNoGap, MonoPcm};
use serde::Deserialize;

use crate::error::PodcastError;

/// Container of the exported episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp3,
    Wav,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Wav => "wav",
        }
    }
}

/// Mono 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Generated silence of the given length.
    pub fn silence(seconds: f64, sample_rate: u32) -> Self {
        let len = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0; len], sample_rate)
    }

    /// Wrap raw little-endian 16-bit mono PCM.
    pub fn from_pcm16le(pcm: &[u8], sample_rate: u32) -> Self {
        let samples = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Decode a WAV buffer.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, PodcastError> {
        decode_wav(WavReader::new(Cursor::new(bytes))?)
    }

    /// Decode a WAV file from disk.
    pub fn from_wav_file<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        decode_wav(WavReader::new(BufReader::new(File::open(path)?))?)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Append another clip, resampling it first if its rate differs.
    pub fn append(&mut self, other: AudioClip) {
        let other = other.resampled(self.sample_rate);
        self.samples.extend(other.samples);
    }

    /// Resample using linear interpolation.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.sample_rate == 0 || target_rate == 0 {
            return self;
        }

        // step > 1.0 shortens, step < 1.0 stretches
        let step = self.sample_rate as f64 / target_rate as f64;
        let new_len = (self.samples.len() as f64 / step) as usize;
        let mut result = Vec::with_capacity(new_len);

        for i in 0..new_len {
            let src_pos = i as f64 * step;
            let src_idx = src_pos as usize;
            let frac = src_pos - src_idx as f64;

            if src_idx + 1 < self.samples.len() {
                let a = self.samples[src_idx] as f64;
                let b = self.samples[src_idx + 1] as f64;
                result.push((a * (1.0 - frac) + b * frac).round() as i16);
            } else if src_idx < self.samples.len() {
                result.push(self.samples[src_idx]);
            }
        }

        Self::new(result, target_rate)
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Encode as a complete WAV buffer.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, PodcastError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec())?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Encode as constant bitrate MP3 with LAME defaults.
    pub fn to_mp3_bytes(&self) -> Result<Vec<u8>, PodcastError> {
        let mut builder = Builder::new()
            .ok_or_else(|| PodcastError::Encode("failed to allocate LAME encoder".to_string()))?;
        builder
            .set_num_channels(1)
            .map_err(|e| PodcastError::Encode(format!("{:?}", e)))?;
        builder
            .set_sample_rate(self.sample_rate)
            .map_err(|e| PodcastError::Encode(format!("{:?}", e)))?;
        let mut encoder = builder
            .build()
            .map_err(|e| PodcastError::Encode(format!("{:?}", e)))?;

        let mut out = Vec::new();
        out.reserve(mp3lame_encoder::max_required_buffer_size(self.samples.len()));
        encoder
            .encode_to_vec(MonoPcm(&self.samples), &mut out)
            .map_err(|e| PodcastError::Encode(format!("{:?}", e)))?;
        // Room for the last frames held back by the encoder.
        out.reserve(7200);
        encoder
            .flush_to_vec::<FlushNoGap>(&mut out)
            .map_err(|e| PodcastError::Encode(format!("{:?}", e)))?;
        Ok(out)
    }

    /// Save as a WAV file.
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), PodcastError> {
        let mut writer = WavWriter::create(path, self.spec())?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm16le_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, PodcastError> {
    AudioClip::from_pcm16le(pcm, sample_rate).to_wav_bytes()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn scale_to_i16(value: i32, bits: u16) -> i16 {
    if bits < 16 {
        (value << (16 - bits)) as i16
    } else {
        (value >> (bits - 16)) as i16
    }
}

fn decode_wav<R: Read>(reader: WavReader<R>) -> Result<AudioClip, PodcastError> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader.into_samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) if bits <= 32 => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| scale_to_i16(v, bits)))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(PodcastError::Tts(format!(
                "Unsupported WAV sample format: {:?} {}-bit",
                format, bits
            )));
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok(AudioClip::new(samples, spec.sample_rate))
}
