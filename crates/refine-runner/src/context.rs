//! Retrieval context handed to the patch executor.
//!
//! Retrieval backends return chunks in several shapes: a bare string, an
//! object with `content`, an object with `text`, or something else entirely.
//! `RagChunk` names each shape so extraction is one match arm per variant,
//! with unknown shapes rendered as compact JSON.

use serde::{Deserialize, Serialize};

use refinement::Issue;

/// One retrieved context chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RagChunk {
    Text(String),
    Content { content: String },
    TextField { text: String },
    Other(serde_json::Value),
}

impl RagChunk {
    /// Plain text of the chunk.
    pub fn extract(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Content { content } => content.clone(),
            Self::TextField { text } => text.clone(),
            Self::Other(value) => value.to_string(),
        }
    }
}

/// Join non-empty chunk texts, stopping once `max_chars` would be exceeded.
pub fn render_context(chunks: &[RagChunk], max_chars: usize) -> String {
    let mut rendered = String::new();
    for chunk in chunks {
        let text = chunk.extract();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let separator = if rendered.is_empty() { 0 } else { 2 };
        if rendered.len() + separator + text.len() > max_chars {
            break;
        }
        if separator > 0 {
            rendered.push_str("\n\n");
        }
        rendered.push_str(text);
    }
    rendered
}

/// Patch instructions for one targeted issue.
pub fn patch_instructions(target: &Issue) -> String {
    let mut instructions = format!(
        "Fix the {} {} issue at {}: {}",
        target.severity,
        target.criterion.label(),
        target.location,
        target.description
    );
    if let Some(fix) = &target.suggested_fix {
        instructions.push_str(&format!("\nSuggested fix: {}", fix));
    }
    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinement::{Criterion, Severity};

    fn parse(json: &str) -> RagChunk {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_chunk_shapes() {
        assert_eq!(parse(r#""plain""#), RagChunk::Text("plain".into()));
        assert_eq!(
            parse(r#"{"content":"from content"}"#),
            RagChunk::Content {
                content: "from content".into()
            }
        );
        assert_eq!(
            parse(r#"{"text":"from text"}"#),
            RagChunk::TextField {
                text: "from text".into()
            }
        );
        assert!(matches!(parse(r#"{"score":0.4}"#), RagChunk::Other(_)));
    }

    #[test]
    fn test_extract_falls_back_to_json() {
        assert_eq!(parse(r#"{"text":"t"}"#).extract(), "t");
        assert_eq!(parse(r#"{"score":0.5}"#).extract(), r#"{"score":0.5}"#);
        assert_eq!(parse("42").extract(), "42");
    }

    #[test]
    fn test_render_context_respects_budget() {
        let chunks = vec![
            RagChunk::Text("alpha".into()),
            RagChunk::Text("   ".into()),
            RagChunk::TextField {
                text: "beta".into(),
            },
            RagChunk::Text("gamma".into()),
        ];
        assert_eq!(render_context(&chunks, 11), "alpha\n\nbeta");
        assert_eq!(render_context(&chunks, 100), "alpha\n\nbeta\n\ngamma");
        assert_eq!(render_context(&chunks, 3), "");
    }

    #[test]
    fn test_patch_instructions() {
        let issue = Issue::new(
            Criterion::FactualAccuracy,
            Severity::Critical,
            "core",
            "Wrong boiling point",
        )
        .with_fix("Use 100 °C at sea level");
        let text = patch_instructions(&issue);
        assert!(text.starts_with("Fix the critical factual accuracy issue at core"));
        assert!(text.ends_with("Suggested fix: Use 100 °C at sea level"));
    }
}
