//! Dialogue script generation.
//!
//! Drives the two speakers through every outline section, four turns per
//! section, and records the accepted turns and the pauses between them.
//! Each candidate utterance passes a similarity guard against everything
//! already said; repeated rejections fall back to a canned transition line
//! so every turn terminates.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::completion::{CompletionProvider, CompletionRequest, clean_response};
use crate::config::Config;
use crate::error::PodcastError;
use crate::markup::{self, Segment};
use crate::outline::{OutlineGenerator, Section};
use crate::pause::PauseHeuristic;
use crate::similarity;
use crate::speaker::{Cast, Speaker};

/// Turns generated for every outline section.
pub const TURNS_PER_SECTION: usize = 4;

/// Regenerations allowed after the first rejected candidate.
pub const MAX_SIMILARITY_RETRIES: usize = 3;

/// Candidates scoring above this against any earlier line are rejected.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Temperature added per regeneration so retries can diverge.
const RETRY_TEMPERATURE_STEP: f32 = 0.2;

/// One accepted utterance in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
}

/// Run-scoped conversation state.
///
/// Only [`ConversationState::commit`] mutates it, and only for accepted
/// turns, so a rejected candidate leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    transcript: Vec<TurnRecord>,
    utterances: [usize; 2],
    named: [usize; 2],
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[TurnRecord] {
        &self.transcript
    }

    /// Accepted utterances by `speaker` so far.
    pub fn utterance_count(&self, speaker: Speaker) -> usize {
        self.utterances[speaker.index()]
    }

    /// How many accepted utterances mentioned `speaker` by name.
    pub fn named_count(&self, speaker: Speaker) -> usize {
        self.named[speaker.index()]
    }

    /// Transcript rendered as `Name: text` paragraphs.
    pub fn history_text(&self, cast: &Cast) -> String {
        self.transcript
            .iter()
            .map(|record| format!("{}: {}\n\n", cast.name(record.speaker), record.text))
            .collect()
    }

    /// Every line spoken so far, for the similarity guard.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.transcript.iter().flat_map(|record| record.text.lines())
    }

    /// Record an accepted turn and update the counters.
    pub fn commit(&mut self, speaker: Speaker, text: &str, cast: &Cast) {
        let other = speaker.other();
        if text
            .to_lowercase()
            .contains(&cast.name(other).to_lowercase())
        {
            self.named[other.index()] += 1;
        }
        self.utterances[speaker.index()] += 1;
        self.transcript.push(TurnRecord {
            speaker,
            text: text.to_string(),
        });
    }
}

/// Whether this turn must address the other speaker by name: the host on
/// her second utterance, the co-host on his first.
pub fn should_use_name(speaker: Speaker, state: &ConversationState) -> bool {
    match speaker {
        Speaker::Host => state.utterance_count(Speaker::Host) == 1,
        Speaker::CoHost => state.utterance_count(Speaker::CoHost) == 0,
    }
}

pub fn name_usage_instruction(
    speaker: Speaker,
    other_name: &str,
    state: &ConversationState,
    is_final_turn: bool,
) -> String {
    if is_final_turn {
        match speaker {
            Speaker::Host => {
                "This is your final response. Thank the listeners and conclude the podcast."
                    .to_string()
            }
            Speaker::CoHost => "This is your final response. Thank the listeners and say a brief, positive goodbye."
                .to_string(),
        }
    } else if should_use_name(speaker, state) {
        format!(
            "IMPORTANT: Use {other_name}'s name in your response. This is crucial for the conversation flow."
        )
    } else {
        format!("IMPORTANT: Do not use {other_name}'s name in your response.")
    }
}

pub fn length_instruction(
    speaker: Speaker,
    speaker_name: &str,
    state: &ConversationState,
    is_final_turn: bool,
) -> String {
    if speaker == Speaker::Host && state.utterance_count(Speaker::Host) > 1 && !is_final_turn {
        format!(
            "As {speaker_name}, you may provide a more detailed response if you have additional relevant information. \
             Your response can be up to twice as long as usual, but only if it adds significant value to the discussion. \
             If you don't have much to add, keep your response brief as before."
        )
    } else {
        "Keep your response brief, ideally one or two sentences at most.".to_string()
    }
}

/// Canned line used when every candidate for a turn was rejected.
pub fn transition_phrase<R: Rng>(section: &Section, rng: &mut R) -> String {
    let subtopic = section.next_subtopic();
    match rng.gen_range(0..5) {
        0 => "Let's move on to another aspect of this topic.".to_string(),
        1 => format!("Shifting gears a bit, what about {subtopic}?"),
        2 => "That's an interesting point. Now, let's consider another angle.".to_string(),
        3 => format!("Building on that idea, we should also discuss {subtopic}."),
        _ => "That's a good summary of what we've covered. Shall we explore the next part of our topic?"
            .to_string(),
    }
}

/// How a turn's text was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// A generated candidate passed the similarity guard.
    Accepted(String),
    /// Retries ran out; a transition phrase was used instead.
    Transitioned(String),
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Accepted(text) | TurnOutcome::Transitioned(text) => text,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, TurnOutcome::Transitioned(_))
    }
}

/// One generated turn and its position in the episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    /// Voice label written to the script.
    pub voice: String,
    pub section_index: usize,
    pub turn_in_section: usize,
    pub global_index: usize,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub fn text(&self) -> &str {
        self.outcome.text()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScriptEntry {
    Turn(Turn),
    Pause { seconds: f64 },
}

/// A finished episode script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub sections: Vec<Section>,
    entries: Vec<ScriptEntry>,
}

impl Script {
    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.entries.iter().filter_map(|entry| match entry {
            ScriptEntry::Turn(turn) => Some(turn),
            ScriptEntry::Pause { .. } => None,
        })
    }

    pub fn pauses(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            ScriptEntry::Pause { seconds } => Some(*seconds),
            ScriptEntry::Turn(_) => None,
        })
    }

    pub fn turn_count(&self) -> usize {
        self.turns().count()
    }

    pub fn to_segments(&self) -> Vec<Segment> {
        self.entries
            .iter()
            .map(|entry| match entry {
                ScriptEntry::Turn(turn) => Segment::utterance(&turn.voice, turn.text()),
                ScriptEntry::Pause { seconds } => Segment::pause(*seconds),
            })
            .collect()
    }

    /// Serialize to the markup dialect.
    pub fn to_markup(&self) -> String {
        markup::render(&self.to_segments())
    }
}

/// Callback for script events.
pub type ScriptCallback = Box<dyn Fn(ScriptEvent) + Send + Sync>;

/// Events emitted while writing a script.
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    OutlineReady { outline: String, sections: usize },
    SectionStart { number: usize, heading: String },
    /// A speaker is about to be generated.
    TurnStart {
        speaker: String,
        global_index: usize,
        total: usize,
    },
    TurnComplete {
        speaker: String,
        outcome: TurnOutcome,
    },
    Pause { seconds: f64 },
    ScriptEnd { turns: usize },
}

/// Generates the dialogue for an outline.
pub struct DialogueEngine {
    completion: Arc<dyn CompletionProvider>,
    cast: Cast,
    topic: String,
    editorial_guidelines: String,
    model: String,
    state: ConversationState,
    pauses: PauseHeuristic,
    rng: StdRng,
    callback: Option<ScriptCallback>,
}

impl DialogueEngine {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        cast: Cast,
        topic: impl Into<String>,
        editorial_guidelines: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            cast,
            topic: topic.into(),
            editorial_guidelines: editorial_guidelines.into(),
            model: model.into(),
            state: ConversationState::new(),
            pauses: PauseHeuristic::default(),
            rng: StdRng::from_entropy(),
            callback: None,
        }
    }

    /// Engine using the configured personas, guidelines and utterance model.
    pub fn from_config(
        completion: Arc<dyn CompletionProvider>,
        config: &Config,
        topic: impl Into<String>,
    ) -> Self {
        Self::new(
            completion,
            config.cast(),
            topic,
            config.editorial_guidelines.clone(),
            config.utterance_model.clone(),
        )
    }

    /// Seed the transition choice and the pause heuristic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.pauses = PauseHeuristic::seeded(seed);
        self
    }

    pub fn with_pause_heuristic(mut self, pauses: PauseHeuristic) -> Self {
        self.pauses = pauses;
        self
    }

    pub fn with_callback(mut self, callback: ScriptCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Draft the outline, then run the dialogue over its sections.
    pub async fn write(&mut self, outline: &OutlineGenerator) -> Result<Script, PodcastError> {
        let (text, sections) = outline
            .sections(&self.topic, &self.editorial_guidelines)
            .await?;
        info!(sections = sections.len(), "outline ready");
        self.emit(ScriptEvent::OutlineReady {
            outline: text,
            sections: sections.len(),
        });
        self.run(&sections).await
    }

    /// Generate every turn of every section, strictly in order.
    pub async fn run(&mut self, sections: &[Section]) -> Result<Script, PodcastError> {
        if sections.is_empty() {
            return Err(PodcastError::EmptyOutline);
        }

        self.state = ConversationState::new();
        let total = sections.len() * TURNS_PER_SECTION;
        let mut entries = Vec::with_capacity(total * 2);

        for (section_index, section) in sections.iter().enumerate() {
            self.emit(ScriptEvent::SectionStart {
                number: section.number,
                heading: section.heading().to_string(),
            });

            for turn_in_section in 0..TURNS_PER_SECTION {
                let speaker = Speaker::for_turn(turn_in_section);
                let global_index = section_index * TURNS_PER_SECTION + turn_in_section;
                let is_final_turn = global_index + 1 == total;
                let name = self.cast.name(speaker).to_string();

                self.emit(ScriptEvent::TurnStart {
                    speaker: name.clone(),
                    global_index,
                    total,
                });

                let outcome = self.generate_turn(speaker, section, is_final_turn).await?;
                self.state.commit(speaker, outcome.text(), &self.cast);
                debug!(
                    speaker = %name,
                    global_index,
                    transition = outcome.is_transition(),
                    "turn committed"
                );

                self.emit(ScriptEvent::TurnComplete {
                    speaker: name.clone(),
                    outcome: outcome.clone(),
                });

                let text = outcome.text().to_string();
                entries.push(ScriptEntry::Turn(Turn {
                    speaker,
                    voice: self.cast.persona(speaker).voice_label().to_string(),
                    section_index,
                    turn_in_section,
                    global_index,
                    outcome,
                }));

                if is_final_turn {
                    continue;
                }

                let (next_speaker, next_section) = if turn_in_section + 1 < TURNS_PER_SECTION {
                    (Speaker::for_turn(turn_in_section + 1), section.text.as_str())
                } else {
                    (
                        Speaker::for_turn(0),
                        sections
                            .get(section_index + 1)
                            .map(|next| next.text.as_str())
                            .unwrap_or(""),
                    )
                };
                let seconds = self.pauses.pause(&text, next_speaker, next_section);
                self.emit(ScriptEvent::Pause { seconds });
                entries.push(ScriptEntry::Pause { seconds });
            }
        }

        self.emit(ScriptEvent::ScriptEnd { turns: total });
        Ok(Script {
            sections: sections.to_vec(),
            entries,
        })
    }

    /// Prompt for one turn, built from the current state.
    pub fn turn_prompt(&self, speaker: Speaker, section: &Section, is_final_turn: bool) -> String {
        let name = self.cast.name(speaker);
        let other_name = self.cast.name(speaker.other());
        let host_name = self.cast.name(Speaker::Host);
        let cohost_name = self.cast.name(Speaker::CoHost);

        format!(
            "Overall Podcast Topic:\n{topic}\n\n\
             Full Conversation History:\n{history}\n\n\
             Current Podcast Section:\n{section}\n\n\
             Editorial Guidelines:\n{guidelines}\n\n\
             {name_usage}\n\n\
             {name}, please provide your next response.\n\
             Ensure your response maintains continuity with the recent conversation and relates to the overall podcast topic.\n\
             Do not include your name at the beginning of your response.\n\
             Provide your response as plain text without any markdown or formatting.\n\
             {length}\n\
             Advance the conversation with new information or a unique perspective related to the current section.\n\
             If you're {cohost_name}, ask a question that hasn't been asked before or provide a unique insight.\n\
             If you're {host_name}, provide a concise explanation or introduce a new aspect of the topic that hasn't been discussed.\n\
             Be creative and try to approach the topic from a different angle than what has been discussed so far.\n\
             If you're struggling to add new information, try to summarize or conclude the current subtopic and transition to the next one.",
            topic = self.topic,
            history = self.state.history_text(&self.cast),
            section = section.text,
            guidelines = self.editorial_guidelines,
            name_usage = name_usage_instruction(speaker, other_name, &self.state, is_final_turn),
            length = length_instruction(speaker, name, &self.state, is_final_turn),
        )
    }

    /// Generate one turn with the similarity guard and transition fallback.
    async fn generate_turn(
        &mut self,
        speaker: Speaker,
        section: &Section,
        is_final_turn: bool,
    ) -> Result<TurnOutcome, PodcastError> {
        let persona = self.cast.persona(speaker);
        let base = CompletionRequest::new(
            &self.model,
            self.turn_prompt(speaker, section, is_final_turn),
        )
        .with_system(&persona.system_prompt);

        for attempt in 0..=MAX_SIMILARITY_RETRIES {
            let mut request = base.clone();
            request.temperature += attempt as f32 * RETRY_TEMPERATURE_STEP;

            let candidate = clean_response(&self.completion.complete(&request).await?);
            if candidate.is_empty() {
                warn!(speaker = %persona.name, attempt, "empty response, regenerating");
                continue;
            }

            let score = similarity::max_ratio(&candidate, self.state.lines());
            if score > SIMILARITY_THRESHOLD {
                warn!(
                    speaker = %persona.name,
                    attempt,
                    score,
                    "response too similar to earlier dialogue, regenerating"
                );
                continue;
            }

            return Ok(TurnOutcome::Accepted(candidate));
        }

        warn!(
            speaker = %persona.name,
            "retries exhausted, falling back to a transition"
        );
        Ok(TurnOutcome::Transitioned(transition_phrase(
            section,
            &mut self.rng,
        )))
    }

    fn emit(&self, event: ScriptEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
