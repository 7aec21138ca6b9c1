//! Image descriptions grounded in nearby Q&A pairs

use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::llm::DocumentPrompts;
use crate::llm::ImageInput;
use crate::llm::TextGenerator;
use crate::models::ExtractedImage;
use crate::models::ProcessedDocument;
use crate::models::QaPair;
use crate::storage::BlobStore;
use crate::storage::S3Location;

/// Q&A pair on the image's page, else the one on the nearest page (earliest wins ties)
pub fn find_associated_qa<'a>(image: &ExtractedImage, qa_pairs: &'a [QaPair]) -> Option<&'a QaPair> {
    qa_pairs
        .iter()
        .find(|qa| qa.page_number == image.page_number)
        .or_else(|| {
            qa_pairs
                .iter()
                .min_by_key(|qa| (qa.page_number - image.page_number).unsigned_abs())
        })
}

pub fn qa_context(qa: &QaPair) -> String {
    format!("Question: {}\nAnswer: {}", qa.question, qa.answer)
}

/// Writes AI descriptions (and linked Q&A) onto a document's extracted images
pub struct ImageDescriber {
    generator: Arc<dyn TextGenerator>,
    blobs: Arc<dyn BlobStore>,
}

impl ImageDescriber {
    pub fn new(generator: Arc<dyn TextGenerator>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { generator, blobs }
    }

    /// Describe every usable image in place; returns how many were described.
    ///
    /// Images with an extraction error or without an extracted image are left
    /// untouched. A failed description is recorded as text, never propagated.
    pub async fn describe_document(&self, document: &mut ProcessedDocument) -> usize {
        let qa_pairs = document.qa_pairs.clone();
        let mut described = 0;

        for image in &mut document.document_content.images {
            if image.extraction_error.is_some() {
                debug!("Skipping image on page {} with extraction error", image.page_number);
                continue;
            }
            let Some(location) = image
                .extracted_image_s3_uri
                .as_deref()
                .and_then(S3Location::parse)
            else {
                continue;
            };

            let qa = find_associated_qa(image, &qa_pairs).cloned();
            let description = match self.describe(&location, qa.as_ref()).await {
                Ok(description) => description,
                Err(e) => {
                    warn!("⚠️  Could not describe {}: {}", location.uri(), e);
                    format!("Error generating description: {e}")
                }
            };

            image.text_content = match &qa {
                Some(qa) => format!("{description}\n\n{}", qa_context(qa)),
                None => description.clone(),
            };
            image.ai_generated_description = Some(description);
            image.associated_qa = qa;
            described += 1;
        }

        info!(
            "🖼️  Described {} images for document {}",
            described, document.document_id
        );
        described
    }

    async fn describe(&self, location: &S3Location, qa: Option<&QaPair>) -> Result<String> {
        let bytes = self.blobs.get_object(&location.bucket, &location.key).await?;
        let image = ImageInput::from_key(&location.key, bytes);

        let prompt = match qa {
            Some(qa) => DocumentPrompts::describe_image_with_context()
                .render(&[("context", qa_context(qa).as_str())]),
            None => DocumentPrompts::describe_image().render(&[]),
        };

        let description = self.generator.generate_text(&prompt, Some(&image)).await?;
        let description = description.trim();
        if description.is_empty() {
            return Err(DocRagError::LlmError("empty description".to_string()));
        }
        Ok(description.to_string())
    }
}
