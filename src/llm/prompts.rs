//! Prompt templates for document understanding

/// Template with `{{name}}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: &'static str,
    variables: Vec<&'static str>,
}

impl PromptTemplate {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            variables: placeholders(template),
        }
    }

    /// Substitute every known placeholder; unknown ones are left as-is
    #[must_use]
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut rendered = self.template.to_string();
        for (name, value) in values {
            if self.variables.iter().any(|v| v == name) {
                rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
            }
        }
        rendered
    }

    #[must_use]
    pub fn variables(&self) -> &[&'static str] {
        &self.variables
    }
}

fn placeholders(template: &'static str) -> Vec<&'static str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && !found.contains(&name) {
            found.push(name);
        }
        rest = &after[end + 2..];
    }
    found
}

/// Prompts used by ingestion and question answering
pub struct DocumentPrompts;

impl DocumentPrompts {
    /// Plain image description
    #[must_use]
    pub fn describe_image() -> PromptTemplate {
        PromptTemplate::new(
            "Describe this image in detail. What are the key objects, context, and any text visible? \
If it's a document or screenshot, summarize its purpose and content.",
        )
    }

    /// Image description grounded in the surrounding Q&A text
    #[must_use]
    pub fn describe_image_with_context() -> PromptTemplate {
        PromptTemplate::new(
            r"Describe this image in detail. What are the key objects, context, and any text visible?

This image appears in a document with the following surrounding text:
{{context}}

Based on this context and the image content, provide a detailed description that explains:
1. What the image shows
2. How it relates to the surrounding text (especially if it's part of a question and answer)
3. Any text visible in the image itself
4. The specific purpose this image serves in the document

If it's a document or screenshot, summarize its purpose and content.",
        )
    }

    /// Metadata extraction over the start of a document
    #[must_use]
    pub fn extract_metadata() -> PromptTemplate {
        PromptTemplate::new(
            r#"I have a document with the following content:

Text: {{text}}

Document Type: {{document_type}}
Is Image: {{is_image}}

Please analyze this document and provide the following metadata:
1. A concise title for the document
2. A summary of the document content (max 200 words)
3. Key topics or themes in the document
4. Document category (e.g., financial, legal, technical, etc.)
5. Entities mentioned (people, organizations, locations, etc.)
6. If this is an image, describe what the image appears to contain based on the text

Format your response as JSON with the following structure:
{
    "title": "Document Title",
    "summary": "Document summary...",
    "topics": ["topic1", "topic2", "topic3"],
    "category": "document category",
    "entities": {
        "people": ["person1", "person2"],
        "organizations": ["org1", "org2"],
        "locations": ["location1", "location2"]
    },
    "imageDescription": "Description of the image content (if applicable)"
}"#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_in_order() {
        let template = PromptTemplate::new("Hello {{name}}, {{ age }} and {{name}} again");
        assert_eq!(template.variables(), &["name", "age"]);
    }

    #[test]
    fn test_render_leaves_unknown() {
        let template = PromptTemplate::new("Hello {{name}} from {{place}}!");
        assert_eq!(
            template.render(&[("name", "Alice"), ("other", "x")]),
            "Hello Alice from {{place}}!"
        );
    }

    #[test]
    fn test_metadata_prompt_keeps_json_braces() {
        let template = DocumentPrompts::extract_metadata();
        assert_eq!(template.variables(), &["text", "document_type", "is_image"]);
        let prompt = template.render(&[("text", "hello"), ("document_type", "pdf"), ("is_image", "false")]);
        assert!(prompt.contains("Text: hello"));
        assert!(prompt.contains("\"title\": \"Document Title\""));
    }

    #[test]
    fn test_context_prompt() {
        let prompt = DocumentPrompts::describe_image_with_context()
            .render(&[("context", "Question: Q\nAnswer: A")]);
        assert!(prompt.contains("Question: Q\nAnswer: A"));
        assert!(DocumentPrompts::describe_image().variables().is_empty());
    }
}
