//! Textract document analysis behind the extraction job seam

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_textract::types::Block;
use aws_sdk_textract::types::BlockType;
use aws_sdk_textract::types::DocumentLocation;
use aws_sdk_textract::types::EntityType;
use aws_sdk_textract::types::FeatureType;
use aws_sdk_textract::types::JobStatus;
use aws_sdk_textract::types::RelationshipType;
use aws_sdk_textract::types::S3Object;
use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use super::extract::file_extension;
use super::extract::BlobTextExtractor;
use super::TextExtractor;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::DocumentContent;
use crate::models::ExtractedImage;
use crate::models::FormField;
use crate::poll::PollStatus;
use crate::storage::BlobStore;

const ANALYZED_EXTENSIONS: [&str; 6] = [".pdf", ".png", ".jpg", ".jpeg", ".tiff", ".tif"];

/// Runs Textract analysis (tables and forms) for PDFs and scans; plain text
/// files go through [`BlobTextExtractor`]
pub struct TextractExtractor {
    client: aws_sdk_textract::Client,
    local: BlobTextExtractor,
    /// job id -> (bucket, key) of the analyzed object
    jobs: DashMap<String, (String, String)>,
}

impl TextractExtractor {
    pub fn new(sdk_config: &aws_config::SdkConfig, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            client: aws_sdk_textract::Client::new(sdk_config),
            local: BlobTextExtractor::new(blobs),
            jobs: DashMap::new(),
        }
    }

    async fn all_blocks(&self, job_id: &str, first: Vec<Block>, mut next: Option<String>) -> Result<Vec<Block>> {
        let mut blocks = first;
        while let Some(token) = next {
            let page = self
                .client
                .get_document_analysis()
                .job_id(job_id)
                .next_token(token)
                .send()
                .await
                .map_err(|e| DocRagError::Custom(format!("Textract results for {job_id}: {e}")))?;
            blocks.extend(page.blocks().iter().cloned());
            next = page.next_token().map(ToString::to_string);
        }
        Ok(blocks)
    }
}

#[async_trait]
impl TextExtractor for TextractExtractor {
    async fn start_job(&self, bucket: &str, key: &str) -> Result<String> {
        if !ANALYZED_EXTENSIONS.contains(&file_extension(key).as_str()) {
            return self.local.start_job(bucket, key).await;
        }

        let location = DocumentLocation::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();
        let response = self
            .client
            .start_document_analysis()
            .document_location(location)
            .set_feature_types(Some(vec![FeatureType::Tables, FeatureType::Forms]))
            .send()
            .await
            .map_err(|e| DocRagError::Custom(format!("Textract start for s3://{bucket}/{key}: {e}")))?;

        let job_id = response
            .job_id()
            .ok_or_else(|| DocRagError::Custom("Textract returned no job id".to_string()))?
            .to_string();
        self.jobs
            .insert(job_id.clone(), (bucket.to_string(), key.to_string()));
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<PollStatus<DocumentContent>> {
        let Some(source) = self.jobs.get(job_id).map(|entry| entry.value().clone()) else {
            return self.local.job_status(job_id).await;
        };

        let response = self
            .client
            .get_document_analysis()
            .job_id(job_id)
            .send()
            .await
            .map_err(|e| DocRagError::Custom(format!("Textract status for {job_id}: {e}")))?;

        let status = match response.job_status() {
            Some(JobStatus::InProgress) => return Ok(PollStatus::Pending),
            Some(JobStatus::Succeeded) => JobStatus::Succeeded,
            Some(JobStatus::PartialSuccess) => {
                warn!("Textract job {} completed with partial success", job_id);
                JobStatus::PartialSuccess
            }
            other => {
                self.jobs.remove(job_id);
                let reason = response
                    .status_message()
                    .map_or_else(|| format!("job status {other:?}"), ToString::to_string);
                return Ok(PollStatus::Failed(reason));
            }
        };

        let blocks = self
            .all_blocks(
                job_id,
                response.blocks().to_vec(),
                response.next_token().map(ToString::to_string),
            )
            .await?;
        self.jobs.remove(job_id);
        debug!("Textract job {} ({:?}) returned {} blocks", job_id, status, blocks.len());

        let (bucket, key) = source;
        Ok(PollStatus::Completed(content_from_blocks(&blocks, &bucket, &key)))
    }
}

fn child_text(block: &Block, words: &HashMap<&str, &str>) -> String {
    block
        .relationships()
        .iter()
        .filter(|rel| rel.r#type() == Some(&RelationshipType::Child))
        .flat_map(|rel| rel.ids())
        .filter_map(|id| words.get(id.as_str()).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lines as text, tables by cell position, key/value form fields, and one
/// page image per PDF page with text (or the scan itself for images)
pub fn content_from_blocks(blocks: &[Block], bucket: &str, key: &str) -> DocumentContent {
    let extension = file_extension(key);
    let is_pdf = extension == ".pdf";

    let by_id: HashMap<&str, &Block> = blocks
        .iter()
        .filter_map(|b| b.id().map(|id| (id, b)))
        .collect();
    let words: HashMap<&str, &str> = blocks
        .iter()
        .filter(|b| b.block_type() == Some(&BlockType::Word))
        .filter_map(|b| Some((b.id()?, b.text()?)))
        .collect();

    let mut text_content = String::new();
    let mut page_lines: BTreeMap<i32, String> = BTreeMap::new();
    for block in blocks.iter().filter(|b| b.block_type() == Some(&BlockType::Line)) {
        let Some(text) = block.text() else { continue };
        text_content.push_str(text);
        text_content.push('\n');
        let page = page_lines.entry(block.page().unwrap_or(1)).or_default();
        page.push_str(text);
        page.push('\n');
    }

    let mut tables = Vec::new();
    for table in blocks.iter().filter(|b| b.block_type() == Some(&BlockType::Table)) {
        let mut cells: BTreeMap<i32, BTreeMap<i32, String>> = BTreeMap::new();
        let cell_ids = table
            .relationships()
            .iter()
            .filter(|rel| rel.r#type() == Some(&RelationshipType::Child))
            .flat_map(|rel| rel.ids());
        for cell in cell_ids.filter_map(|id| by_id.get(id.as_str())) {
            if cell.block_type() != Some(&BlockType::Cell) {
                continue;
            }
            let (Some(row), Some(column)) = (cell.row_index(), cell.column_index()) else {
                continue;
            };
            cells
                .entry(row)
                .or_default()
                .insert(column, child_text(cell, &words));
        }
        tables.push(
            cells
                .into_values()
                .map(|row| row.into_values().collect())
                .collect(),
        );
    }

    let mut forms = Vec::new();
    let keys = blocks.iter().filter(|b| {
        b.block_type() == Some(&BlockType::KeyValueSet) && b.entity_types().contains(&EntityType::Key)
    });
    for key_block in keys {
        let key_text = child_text(key_block, &words);
        let value_text = key_block
            .relationships()
            .iter()
            .filter(|rel| rel.r#type() == Some(&RelationshipType::Value))
            .flat_map(|rel| rel.ids())
            .find_map(|id| by_id.get(id.as_str()))
            .map(|value| child_text(value, &words))
            .unwrap_or_default();
        if !key_text.is_empty() && !value_text.is_empty() {
            forms.push(FormField {
                key: key_text,
                value: value_text,
            });
        }
    }

    let is_image = !is_pdf;
    let images = if is_pdf {
        page_lines
            .into_iter()
            .map(|(page, text)| ExtractedImage {
                source_bucket: bucket.to_string(),
                source_key: key.to_string(),
                page_number: i64::from(page),
                file_type: Some(extension.clone()),
                text_content: text,
                s3_uri: Some(format!("s3://{bucket}/{key}#page={page}")),
                ..ExtractedImage::default()
            })
            .collect()
    } else {
        vec![ExtractedImage {
            source_bucket: bucket.to_string(),
            source_key: key.to_string(),
            page_number: 1,
            file_type: Some(extension.clone()),
            text_content: text_content.clone(),
            s3_uri: Some(format!("s3://{bucket}/{key}")),
            ..ExtractedImage::default()
        }]
    };

    DocumentContent {
        document_type: extension,
        text_content,
        tables,
        forms,
        images,
        is_image,
    }
}
