//! PodcastAI Core Library
//!
//! Outline drafting, two-speaker dialogue generation, the dialogue markup
//! dialect, speech synthesis backends and audio assembly.

pub mod assembler;
pub mod audio;
pub mod completion;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod markup;
pub mod outline;
pub mod pause;
pub mod similarity;
pub mod speaker;
pub mod tts;

pub use assembler::{AssemblyEvent, AudioAssembler};
pub use audio::{AudioClip, ExportFormat};
pub use completion::{CompletionProvider, CompletionRequest, OpenAiCompletion};
pub use config::Config;
pub use dialogue::{DialogueEngine, Script, ScriptEvent, Turn, TurnOutcome};
pub use error::PodcastError;
pub use markup::Segment;
pub use outline::{OutlineGenerator, Section};
pub use pause::{PauseHeuristic, PauseSignalSource};
pub use speaker::{Cast, Persona, Speaker};
pub use tts::{Synthesizer, create_synthesizer};
