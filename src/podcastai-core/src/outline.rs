//! Episode outline generation.
//!
//! The outline is a numbered list of main topics with indented sub-bullets.
//! Each numbered entry becomes one [`Section`], which drives a fixed number
//! of dialogue turns.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::error::PodcastError;

static SECTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("valid section regex"));

/// Fallback used by transitions when a section has no sub-bullets.
const NEXT_POINT_FALLBACK: &str = "the next point";

/// One numbered entry of the outline, with its sub-points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    /// 1-based position in the outline.
    pub number: usize,
    /// Heading line followed by every line up to the next heading, trimmed.
    pub text: String,
}

impl Section {
    /// The numbered heading line.
    pub fn heading(&self) -> &str {
        self.text.lines().next().unwrap_or_default().trim()
    }

    /// First `-` bullet below the heading, used to phrase topic transitions.
    pub fn next_subtopic(&self) -> &str {
        self.text
            .lines()
            .skip(1)
            .map(str::trim)
            .find_map(|line| line.strip_prefix('-'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NEXT_POINT_FALLBACK)
    }
}

/// Split outline text into sections.
///
/// A line whose trimmed form starts with an integer followed by a period
/// opens a new section; every other line (blank lines included) is appended
/// to the current one. Text before the first numbered line is dropped.
pub fn split_sections(outline: &str) -> Vec<Section> {
    let mut bodies: Vec<String> = Vec::new();

    for line in outline.lines() {
        if SECTION_START.is_match(line.trim()) {
            bodies.push(line.to_string());
        } else if let Some(current) = bodies.last_mut() {
            current.push('\n');
            current.push_str(line);
        } else if !line.trim().is_empty() {
            debug!(line, "ignoring outline text before first section");
        }
    }

    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| Section {
            number: i + 1,
            text: body.trim().to_string(),
        })
        .collect()
}

/// Drafts the episode outline with a single completion call.
pub struct OutlineGenerator {
    completion: Arc<dyn CompletionProvider>,
    model: String,
}

impl OutlineGenerator {
    pub fn new(completion: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }

    /// Build the outline instruction for a topic.
    pub fn prompt(topic_content: &str, editorial_guidelines: &str) -> String {
        format!(
            "Given the following topic information:\n{topic_content}\n\n\
             And the editorial guidelines:\n{editorial_guidelines}\n\n\
             Generate a detailed outline for a podcast episode, with the individual sub-topics as separate items in the list. \
             Please format the outline as follows:\n\
             1. Main Topic 1\n   - Subtopic 1a\n   - Subtopic 1b\n\
             2. Main Topic 2\n   - Subtopic 2a\n   - Subtopic 2b\n\
             ... and so on.\n\
             Ensure each main topic is numbered and on its own line."
        )
    }

    /// Generate the raw outline text.
    pub async fn generate(
        &self,
        topic_content: &str,
        editorial_guidelines: &str,
    ) -> Result<String, PodcastError> {
        let request =
            CompletionRequest::new(&self.model, Self::prompt(topic_content, editorial_guidelines));
        let outline = self.completion.complete(&request).await?;
        debug!(%outline, "outline generated");
        Ok(outline.trim().to_string())
    }

    /// Generate the outline and split it, failing on an outline without sections.
    pub async fn sections(
        &self,
        topic_content: &str,
        editorial_guidelines: &str,
    ) -> Result<(String, Vec<Section>), PodcastError> {
        let outline = self.generate(topic_content, editorial_guidelines).await?;
        let sections = split_sections(&outline);
        if sections.is_empty() {
            return Err(PodcastError::EmptyOutline);
        }
        Ok((outline, sections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const OUTLINE: &str = "1. Introduction to Vector Databases\n   - What embeddings are\n   - Why similarity search matters\n\n2. Indexing\n   - HNSW graphs\n3. Wrap-up";

    #[test]
    fn test_split_sections_basic() {
        let sections = split_sections(OUTLINE);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].number, 1);
        assert_eq!(sections[0].heading(), "1. Introduction to Vector Databases");
        assert!(sections[0].text.contains("Why similarity search matters"));
        assert_eq!(sections[1].text, "2. Indexing\n   - HNSW graphs");
        assert_eq!(sections[2].text, "3. Wrap-up");
    }

    #[test]
    fn test_split_sections_ignores_preamble() {
        let sections = split_sections("Here is your outline:\n\n1. Intro\n2. Outro");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "1. Intro");
    }

    #[test]
    fn test_split_sections_no_numbered_lines() {
        assert!(split_sections("- just\n- bullets").is_empty());
        assert!(split_sections("").is_empty());
    }

    #[test]
    fn test_split_sections_indented_heading() {
        let sections = split_sections("  1. Indented\n  10. Ten");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].heading(), "10. Ten");
    }

    #[test]
    fn test_next_subtopic() {
        let sections = split_sections(OUTLINE);
        assert_eq!(sections[0].next_subtopic(), "What embeddings are");
        assert_eq!(sections[2].next_subtopic(), "the next point");
    }

    struct CannedCompletion {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CompletionProvider for CannedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, PodcastError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_generator_embeds_topic_and_guidelines() {
        let completion = Arc::new(CannedCompletion {
            response: OUTLINE.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let generator = OutlineGenerator::new(completion.clone(), "gpt-4o-mini");
        let (_, sections) = generator
            .sections("Vector databases", "No jargon.")
            .await
            .unwrap();

        assert_eq!(sections.len(), 3);
        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Vector databases"));
        assert!(prompts[0].contains("No jargon."));
        assert!(prompts[0].contains("1. Main Topic 1"));
    }

    #[tokio::test]
    async fn test_generator_empty_outline_is_error() {
        let completion = Arc::new(CannedCompletion {
            response: "I cannot help with that.".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let generator = OutlineGenerator::new(completion, "gpt-4o-mini");
        let err = generator.sections("topic", "").await.unwrap_err();
        assert!(matches!(err, PodcastError::EmptyOutline));
    }
}
