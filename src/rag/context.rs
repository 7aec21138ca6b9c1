//! Context assembly from knowledge-base passages

use crate::models::Passage;

/// Label used when a passage carries no source location
pub const UNKNOWN_SOURCE: &str = "Unknown source";

/// Builds the `Source:`/`Content:` context handed to the generator
pub struct ContextAssembler {
    max_context_length: usize,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(max_context_length: usize) -> Self {
        Self { max_context_length }
    }

    /// Concatenate passages in rank order until the length budget is spent
    #[must_use]
    pub fn assemble(&self, passages: &[Passage]) -> String {
        let mut context = String::new();

        for passage in passages {
            let entry = format!(
                "Source: {}\nContent: {}\n\n",
                source_of(passage),
                passage.text.trim()
            );

            if context.len() + entry.len() > self.max_context_length {
                break;
            }
            context.push_str(&entry);
        }

        context
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(8000)
    }
}

fn source_of(passage: &Passage) -> &str {
    passage
        .source_uri
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
}

/// Source label for every passage, in rank order
pub fn sources(passages: &[Passage]) -> Vec<String> {
    passages.iter().map(|p| source_of(p).to_string()).collect()
}
