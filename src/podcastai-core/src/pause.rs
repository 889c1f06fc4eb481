//! Pause durations between consecutive turns.
//!
//! The duration bracket is picked from shallow signals, first match wins:
//! answering a question, topic change, high engagement, low engagement,
//! normal. Engagement and topic change come from a [`PauseSignalSource`].

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::speaker::Speaker;

static TRAILING_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?\s*$").expect("valid question regex"));

/// How engaged the exchange around a transition feels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    High,
    Normal,
    Low,
}

/// Source of the heuristic signals that are not derived from text.
pub trait PauseSignalSource: Send {
    fn engagement(
        &mut self,
        current_utterance: &str,
        next_speaker: Speaker,
        next_section: &str,
    ) -> Engagement;

    fn topic_change(&mut self, current_utterance: &str, next_section: &str) -> bool;
}

/// Independent uniform draws for both signals.
pub struct RandomSignals {
    rng: StdRng,
}

impl RandomSignals {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseSignalSource for RandomSignals {
    fn engagement(&mut self, _: &str, _: Speaker, _: &str) -> Engagement {
        match self.rng.gen_range(0..3) {
            0 => Engagement::High,
            1 => Engagement::Normal,
            _ => Engagement::Low,
        }
    }

    fn topic_change(&mut self, _: &str, _: &str) -> bool {
        self.rng.gen_bool(0.5)
    }
}

/// Constant signals, for reproducible scripts and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSignals {
    pub engagement: Engagement,
    pub topic_change: bool,
}

impl PauseSignalSource for FixedSignals {
    fn engagement(&mut self, _: &str, _: Speaker, _: &str) -> Engagement {
        self.engagement
    }

    fn topic_change(&mut self, _: &str, _: &str) -> bool {
        self.topic_change
    }
}

/// True if the utterance ends with a question mark, ignoring trailing whitespace.
pub fn is_question(utterance: &str) -> bool {
    TRAILING_QUESTION.is_match(utterance)
}

/// Duration bracket in seconds for the given signals.
pub fn pause_bracket(
    answering_question: bool,
    topic_change: bool,
    engagement: Engagement,
) -> RangeInclusive<f64> {
    if answering_question {
        0.3..=0.6
    } else if topic_change {
        1.8..=2.5
    } else {
        match engagement {
            Engagement::High => 0.5..=0.8,
            Engagement::Low => 1.5..=2.0,
            Engagement::Normal => 0.9..=1.5,
        }
    }
}

/// Picks pause durations between turns.
pub struct PauseHeuristic {
    signals: Box<dyn PauseSignalSource>,
    rng: StdRng,
}

impl PauseHeuristic {
    pub fn new(signals: Box<dyn PauseSignalSource>) -> Self {
        Self {
            signals,
            rng: StdRng::from_entropy(),
        }
    }

    /// Random signals and durations, both driven by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            signals: Box::new(RandomSignals::seeded(seed)),
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
        }
    }

    pub fn with_signals(mut self, signals: Box<dyn PauseSignalSource>) -> Self {
        self.signals = signals;
        self
    }

    /// Pause in seconds after `current_utterance`, rounded to one decimal.
    pub fn pause(&mut self, current_utterance: &str, next_speaker: Speaker, next_section: &str) -> f64 {
        let engagement = self
            .signals
            .engagement(current_utterance, next_speaker, next_section);
        let topic_change = self.signals.topic_change(current_utterance, next_section);
        let answering_question = is_question(current_utterance);

        tracing::debug!(
            ?next_speaker,
            ?engagement,
            topic_change,
            answering_question,
            "choosing pause"
        );

        let seconds = self
            .rng
            .gen_range(pause_bracket(answering_question, topic_change, engagement));
        (seconds * 10.0).round() / 10.0
    }
}

impl Default for PauseHeuristic {
    fn default() -> Self {
        Self::new(Box::new(RandomSignals::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(engagement: Engagement, topic_change: bool) -> PauseHeuristic {
        PauseHeuristic::seeded(7).with_signals(Box::new(FixedSignals {
            engagement,
            topic_change,
        }))
    }

    fn assert_within(heuristic: &mut PauseHeuristic, utterance: &str, lo: f64, hi: f64) {
        for _ in 0..200 {
            let pause = heuristic.pause(utterance, Speaker::CoHost, "2. Next");
            assert!(pause >= lo && pause <= hi, "{pause} not in [{lo}, {hi}]");
            assert!(pause > 0.0);
        }
    }

    #[test]
    fn test_is_question() {
        assert!(is_question("What is an embedding?"));
        assert!(is_question("Really?  \n"));
        assert!(!is_question("Is it? No."));
        assert!(!is_question(""));
    }

    #[test]
    fn test_question_beats_every_other_signal() {
        let mut heuristic = fixed(Engagement::Low, true);
        assert_within(&mut heuristic, "So how does it work?", 0.3, 0.6);
    }

    #[test]
    fn test_topic_change_beats_engagement() {
        let mut heuristic = fixed(Engagement::High, true);
        assert_within(&mut heuristic, "Let's move on.", 1.8, 2.5);
    }

    #[test]
    fn test_engagement_brackets() {
        assert_within(&mut fixed(Engagement::High, false), "Great point.", 0.5, 0.8);
        assert_within(&mut fixed(Engagement::Low, false), "Okay.", 1.5, 2.0);
        assert_within(&mut fixed(Engagement::Normal, false), "I see.", 0.9, 1.5);
    }

    #[test]
    fn test_pause_rounded_to_one_decimal() {
        let mut heuristic = PauseHeuristic::seeded(42);
        for _ in 0..100 {
            let pause = heuristic.pause("Fine.", Speaker::Host, "");
            assert!(((pause * 10.0).round() - pause * 10.0).abs() < 1e-9);
            assert!(pause >= 0.3 && pause <= 2.5);
        }
    }

    #[test]
    fn test_seeded_heuristic_is_reproducible() {
        let mut a = PauseHeuristic::seeded(3);
        let mut b = PauseHeuristic::seeded(3);
        let xs: Vec<f64> = (0..20).map(|_| a.pause("Hm.", Speaker::Host, "")).collect();
        let ys: Vec<f64> = (0..20).map(|_| b.pause("Hm.", Speaker::Host, "")).collect();
        assert_eq!(xs, ys);
    }
}
