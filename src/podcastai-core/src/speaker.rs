//! Speaker definitions.
//!
//! An episode always has exactly two speakers. The host guides the
//! conversation and explains; the co-host asks the questions.

use serde::{Deserialize, Serialize};

/// One of the two fixed speaker identities of an episode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Speaker {
    /// Opens every section (even turn indices).
    Host,
    /// Replies to the host (odd turn indices).
    CoHost,
}

impl Speaker {
    /// Speaker for a turn position within a section, by parity.
    pub fn for_turn(turn_in_section: usize) -> Self {
        if turn_in_section % 2 == 0 {
            Speaker::Host
        } else {
            Speaker::CoHost
        }
    }

    pub fn other(self) -> Self {
        match self {
            Speaker::Host => Speaker::CoHost,
            Speaker::CoHost => Speaker::Host,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Speaker::Host => 0,
            Speaker::CoHost => 1,
        }
    }
}

/// The persona a speaker plays for a whole episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Name spoken in the dialogue; also the voice label written to the script.
    pub name: String,
    /// Fully rendered system prompt (placeholders already substituted).
    pub system_prompt: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Label used in `<speak voice="...">` and resolved by the synthesizer.
    pub fn voice_label(&self) -> &str {
        &self.name
    }
}

/// Both personas of an episode, indexed by [`Speaker`].
#[derive(Debug, Clone)]
pub struct Cast {
    personas: [Persona; 2],
}

impl Cast {
    pub fn new(host: Persona, cohost: Persona) -> Self {
        Self {
            personas: [host, cohost],
        }
    }

    pub fn persona(&self, speaker: Speaker) -> &Persona {
        &self.personas[speaker.index()]
    }

    pub fn name(&self, speaker: Speaker) -> &str {
        &self.persona(speaker).name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_alternates_by_parity() {
        let order: Vec<Speaker> = (0..4).map(Speaker::for_turn).collect();
        assert_eq!(
            order,
            vec![Speaker::Host, Speaker::CoHost, Speaker::Host, Speaker::CoHost]
        );
    }

    #[test]
    fn test_other_speaker() {
        assert_eq!(Speaker::Host.other(), Speaker::CoHost);
        assert_eq!(Speaker::CoHost.other(), Speaker::Host);
    }

    #[test]
    fn test_cast_lookup() {
        let cast = Cast::new(Persona::new("Ava", "host"), Persona::new("Marvin", "cohost"));
        assert_eq!(cast.name(Speaker::Host), "Ava");
        assert_eq!(cast.persona(Speaker::CoHost).voice_label(), "Marvin");
    }
}
