//! Asynchronous text extraction jobs

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::DocumentContent;
use crate::models::ExtractedImage;
use crate::poll::poll_with_backoff;
use crate::poll::Backoff;
use crate::poll::PollOutcome;
use crate::poll::PollStatus;
use crate::poll::Sleeper;
use crate::storage::BlobStore;

const IMAGE_EXTENSIONS: [&str; 8] = [".png", ".jpg", ".jpeg", ".tiff", ".tif", ".gif", ".bmp", ".webp"];
const TEXT_EXTENSIONS: [&str; 4] = [".txt", ".csv", ".md", ".json"];

/// Lower-cased extension of the file name in `key`, with its dot
pub fn file_extension(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[dot..].to_lowercase(),
        _ => String::new(),
    }
}

/// OCR-style service that runs as a start-then-poll job
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Start a job for `bucket/key`, returning its id
    async fn start_job(&self, bucket: &str, key: &str) -> Result<String>;

    async fn job_status(&self, job_id: &str) -> Result<PollStatus<DocumentContent>>;
}

/// Run an extraction job to completion.
///
/// # Errors
/// - `Custom` when the job reports failure
/// - `Timeout` when the job is still pending after every attempt
/// - Any error from the extractor itself
pub async fn extract_document(
    extractor: &dyn TextExtractor,
    sleeper: &dyn Sleeper,
    backoff: Backoff,
    bucket: &str,
    key: &str,
) -> Result<DocumentContent> {
    let job_id = extractor.start_job(bucket, key).await?;
    info!("📄 Started text extraction job {} for s3://{}/{}", job_id, bucket, key);

    let outcome = poll_with_backoff(backoff, sleeper, || extractor.job_status(&job_id)).await?;
    match outcome {
        PollOutcome::Completed(content) => {
            info!(
                "✅ Extraction job {} finished with {} images",
                job_id,
                content.images.len()
            );
            Ok(content)
        }
        PollOutcome::Failed(reason) => {
            warn!("Extraction job {} failed: {}", job_id, reason);
            Err(DocRagError::Custom(format!(
                "Text extraction failed for s3://{bucket}/{key}: {reason}"
            )))
        }
        PollOutcome::TimedOut { attempts } => Err(DocRagError::Timeout(format!(
            "Text extraction job {job_id} still running after {attempts} checks"
        ))),
    }
}

/// Local extractor over the blob store: plain text is read as-is and images
/// become image documents with no OCR text. Jobs finish at start.
pub struct BlobTextExtractor {
    blobs: Arc<dyn BlobStore>,
    jobs: DashMap<String, PollStatus<DocumentContent>>,
}

impl BlobTextExtractor {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            jobs: DashMap::new(),
        }
    }

    async fn read(&self, bucket: &str, key: &str) -> Result<PollStatus<DocumentContent>> {
        let extension = file_extension(key);

        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            // Existence check only; the image itself is described later
            self.blobs.get_object(bucket, key).await?;
            let uri = format!("s3://{bucket}/{key}");
            return Ok(PollStatus::Completed(DocumentContent {
                document_type: extension.clone(),
                is_image: true,
                images: vec![ExtractedImage {
                    source_bucket: bucket.to_string(),
                    source_key: key.to_string(),
                    page_number: 1,
                    file_type: Some(extension),
                    s3_uri: Some(uri),
                    ..ExtractedImage::default()
                }],
                ..DocumentContent::default()
            }));
        }

        if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            let body = self.blobs.get_object(bucket, key).await?;
            return Ok(match String::from_utf8(body) {
                Ok(text) => PollStatus::Completed(DocumentContent {
                    document_type: extension,
                    text_content: text,
                    ..DocumentContent::default()
                }),
                Err(_) => PollStatus::Failed(format!("{key} is not valid UTF-8 text")),
            });
        }

        Ok(PollStatus::Failed(format!(
            "Unsupported file type for local extraction: '{extension}'"
        )))
    }
}

#[async_trait]
impl TextExtractor for BlobTextExtractor {
    async fn start_job(&self, bucket: &str, key: &str) -> Result<String> {
        let status = self.read(bucket, key).await?;
        let job_id = Uuid::new_v4().to_string();
        debug!("Local extraction job {} for s3://{}/{}", job_id, bucket, key);
        self.jobs.insert(job_id.clone(), status);
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<PollStatus<DocumentContent>> {
        self.jobs
            .remove(job_id)
            .map(|(_, status)| status)
            .ok_or_else(|| DocRagError::Custom(format!("Unknown extraction job {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Completes after `pending` checks, or fails when `fail` is set
    struct ScriptedExtractor {
        pending: u32,
        fail: bool,
        checks: AtomicU32,
    }

    #[async_trait]
    impl TextExtractor for ScriptedExtractor {
        async fn start_job(&self, _bucket: &str, key: &str) -> Result<String> {
            Ok(format!("job-{key}"))
        }

        async fn job_status(&self, job_id: &str) -> Result<PollStatus<DocumentContent>> {
            assert_eq!(job_id, "job-doc.pdf");
            let n = self.checks.fetch_add(1, Ordering::SeqCst);
            if n < self.pending {
                return Ok(PollStatus::Pending);
            }
            if self.fail {
                return Ok(PollStatus::Failed("unsupported format".to_string()));
            }
            Ok(PollStatus::Completed(DocumentContent {
                document_type: "pdf".to_string(),
                text_content: "hello".to_string(),
                ..DocumentContent::default()
            }))
        }
    }

    fn extractor(pending: u32, fail: bool) -> ScriptedExtractor {
        ScriptedExtractor {
            pending,
            fail,
            checks: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_extraction_completes() {
        let content = extract_document(&extractor(3, false), &NoSleep, Backoff::default(), "in", "doc.pdf")
            .await
            .unwrap();
        assert_eq!(content.text_content, "hello");
    }

    #[tokio::test]
    async fn test_extraction_failure() {
        let err = extract_document(&extractor(0, true), &NoSleep, Backoff::default(), "in", "doc.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }

    #[tokio::test]
    async fn test_extraction_timeout() {
        let backoff = Backoff::fixed(Duration::from_secs(5), 2);
        let err = extract_document(&extractor(10, false), &NoSleep, backoff, "in", "doc.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, DocRagError::Timeout(_)));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("docs/Manual.PDF"), ".pdf");
        assert_eq!(file_extension("v1.2/notes"), "");
        assert_eq!(file_extension(".hidden"), "");
    }

    #[tokio::test]
    async fn test_local_extractor_reads_text_and_images() {
        let blobs = Arc::new(crate::storage::MemoryBlobStore::default());
        blobs
            .put_object("in", "notes.txt", b"Warranty lasts two years.".to_vec(), "text/plain")
            .await
            .unwrap();
        blobs
            .put_object("in", "photos/panel.png", vec![0x89, 0x50], "image/png")
            .await
            .unwrap();
        let extractor = BlobTextExtractor::new(blobs);

        let text = extract_document(&extractor, &NoSleep, Backoff::default(), "in", "notes.txt")
            .await
            .unwrap();
        assert_eq!(text.document_type, ".txt");
        assert_eq!(text.text_content, "Warranty lasts two years.");
        assert!(!text.is_image);

        let image = extract_document(&extractor, &NoSleep, Backoff::default(), "in", "photos/panel.png")
            .await
            .unwrap();
        assert!(image.is_image);
        assert_eq!(image.images.len(), 1);
        assert_eq!(image.images[0].s3_uri.as_deref(), Some("s3://in/photos/panel.png"));
        assert!(extractor.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_local_extractor_rejects_missing_and_unsupported() {
        let blobs = Arc::new(crate::storage::MemoryBlobStore::default());
        blobs
            .put_object("in", "scan.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        let extractor = BlobTextExtractor::new(blobs);

        let err = extract_document(&extractor, &NoSleep, Backoff::default(), "in", "scan.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));

        let err = extract_document(&extractor, &NoSleep, Backoff::default(), "in", "missing.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DocRagError::BlobError(_)));
    }
}
