//! Dialogue markup dialect.
//!
//! Grammar (whitespace between segments is ignored):
//!
//! ```text
//! script    := segment*
//! segment   := utterance | pause
//! utterance := '<speak voice="' LABEL '">' TEXT '</speak>'
//! pause     := '<break ' ('time' | 'strength') '="' NUMBER ('s' | 'ms') '"/>'
//! ```
//!
//! `TEXT` may span lines. Pause durations are normalised to seconds. Any
//! fragment that does not match either production is skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PodcastError;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<speak\s+voice="([^"]+)"\s*>(.*?)</speak>|<break\s+(?:time|strength)="([0-9]*\.?[0-9]+)(ms|s)"\s*/>"#,
    )
    .expect("valid markup regex")
});

/// One parsed unit of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Utterance { voice: String, text: String },
    Pause { seconds: f64 },
}

impl Segment {
    pub fn utterance(voice: impl Into<String>, text: impl Into<String>) -> Self {
        Segment::Utterance {
            voice: voice.into(),
            text: text.into(),
        }
    }

    pub fn pause(seconds: f64) -> Self {
        Segment::Pause { seconds }
    }
}

/// Parse a script into segments, in document order.
pub fn parse(markup: &str) -> Result<Vec<Segment>, PodcastError> {
    if markup.trim().is_empty() {
        return Err(PodcastError::EmptyScript);
    }

    let mut segments = Vec::new();
    for caps in SEGMENT.captures_iter(markup) {
        if let (Some(voice), Some(text)) = (caps.get(1), caps.get(2)) {
            let text = text.as_str().trim();
            if text.is_empty() {
                warn!(voice = voice.as_str(), "skipping empty utterance");
                continue;
            }
            segments.push(Segment::utterance(voice.as_str().trim(), text));
        } else if let (Some(value), Some(unit)) = (caps.get(3), caps.get(4)) {
            let Ok(value) = value.as_str().parse::<f64>() else {
                warn!(value = value.as_str(), "skipping unparseable pause");
                continue;
            };
            let seconds = if unit.as_str() == "ms" {
                value / 1000.0
            } else {
                value
            };
            segments.push(Segment::pause(seconds));
        }
    }

    if segments.is_empty() {
        return Err(PodcastError::NoSynthesizableContent);
    }

    debug!(count = segments.len(), "parsed script");
    Ok(segments)
}

/// Render one utterance element.
pub fn render_utterance(voice: &str, text: &str) -> String {
    format!(r#"<speak voice="{voice}">{text}</speak>"#)
}

/// Render one pause element, in seconds with one decimal.
pub fn render_pause(seconds: f64) -> String {
    format!(r#"<break time="{seconds:.1}s"/>"#)
}

/// Render segments back to markup, one element per paragraph.
pub fn render(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Utterance { voice, text } => render_utterance(voice, text),
            Segment::Pause { seconds } => render_pause(*seconds),
        })
        .map(|element| element + "\n\n")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utterances_and_pause_in_order() {
        let segments = parse(
            r#"<speak voice="Ava">Hello</speak><break time="1.2s"/><speak voice="Marvin">Hi</speak>"#,
        )
        .unwrap();

        assert_eq!(
            segments,
            vec![
                Segment::utterance("Ava", "Hello"),
                Segment::pause(1.2),
                Segment::utterance("Marvin", "Hi"),
            ]
        );
    }

    #[test]
    fn test_parse_legacy_strength_in_milliseconds() {
        let segments = parse(r#"<break strength="750ms"/> <break strength="2s" />"#).unwrap();
        assert_eq!(segments, vec![Segment::pause(0.75), Segment::pause(2.0)]);
    }

    #[test]
    fn test_parse_multiline_text_is_trimmed() {
        let segments =
            parse("<speak voice=\"Ava\">\n  First line.\n  Second line.\n</speak>").unwrap();
        assert_eq!(
            segments,
            vec![Segment::utterance("Ava", "First line.\n  Second line.")]
        );
    }

    #[test]
    fn test_parse_ignores_malformed_fragments() {
        let markup = r#"<speak>no voice</speak>
<break time="abc"/>
<speak voice="Marvin">Kept</speak>
<speak voice="Ava">never closed"#;
        let segments = parse(markup).unwrap();
        assert_eq!(segments, vec![Segment::utterance("Marvin", "Kept")]);
    }

    #[test]
    fn test_parse_skips_empty_utterance() {
        let segments =
            parse(r#"<speak voice="Ava">   </speak><break time="0.5s"/>"#).unwrap();
        assert_eq!(segments, vec![Segment::pause(0.5)]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(matches!(parse("  \n "), Err(PodcastError::EmptyScript)));
    }

    #[test]
    fn test_parse_no_segments() {
        assert!(matches!(
            parse("<speak><p>Hello World</p></speak>"),
            Err(PodcastError::NoSynthesizableContent)
        ));
    }

    #[test]
    fn test_render_then_parse() {
        let segments = vec![
            Segment::utterance("Ava", "Welcome to the show."),
            Segment::pause(0.9),
            Segment::utterance("Marvin", "Glad to be here?"),
        ];
        let markup = render(&segments);
        assert!(markup.contains(r#"<break time="0.9s"/>"#));
        assert_eq!(parse(&markup).unwrap(), segments);
    }

    #[test]
    fn test_render_pause_one_decimal() {
        assert_eq!(render_pause(1.26), r#"<break time="1.3s"/>"#);
        assert_eq!(render_pause(2.0), r#"<break time="2.0s"/>"#);
    }
}
