//! Result Assembler: rank, cap, sign and interleave image results

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;
use tracing::warn;

use crate::config::AppConfig;
use crate::models::ContentBlock;
use crate::models::FormattedImageBlock;
use crate::rag::scorer::ScoredCandidate;
use crate::storage::BlobStore;
use crate::storage::S3Location;
use crate::text::truncate_str;

const DESCRIPTION_FALLBACK_CHARS: usize = 200;

/// Ranking and URL settings
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Candidates must score strictly above this to count as relevant
    pub relevance_threshold: f64,
    pub top_k: usize,
    /// Cap on the Q&A-priority path (Q&A first, then backfill)
    pub qa_top_k: usize,
    pub url_ttl: Duration,
    pub signing_timeout: Duration,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AssemblerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            relevance_threshold: config.retrieval.relevance_threshold,
            top_k: config.retrieval.top_k,
            qa_top_k: config.retrieval.qa_top_k,
            url_ttl: config.url_ttl(),
            signing_timeout: config.signing_timeout(),
        }
    }
}

pub struct ResultAssembler {
    blobs: Arc<dyn BlobStore>,
    options: AssemblerOptions,
}

impl ResultAssembler {
    pub fn new(blobs: Arc<dyn BlobStore>, options: AssemblerOptions) -> Self {
        Self { blobs, options }
    }

    #[must_use]
    pub const fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    /// Rank candidates and keep a bounded, deduplicated subset.
    ///
    /// If any Q&A candidate clears the threshold, Q&A candidates above it go
    /// first and the best non-Q&A candidates above it backfill up to
    /// `qa_top_k`. Otherwise up to `top_k` above the threshold, or the top
    /// `top_k` regardless when none clear it.
    pub fn select(&self, mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });

        let threshold = self.options.relevance_threshold;
        let above = |c: &ScoredCandidate| c.score > threshold;

        let mut picker = Picker::default();
        if candidates.iter().any(|c| c.is_qa() && above(c)) {
            let cap = self.options.qa_top_k;
            picker.take(candidates.iter().filter(|c| c.is_qa() && above(c)), cap);
            picker.take(candidates.iter().filter(|c| !c.is_qa() && above(c)), cap);
            debug!("Q&A priority selection: {} images", picker.picked.len());
        } else {
            let cap = self.options.top_k;
            picker.take(candidates.iter().filter(|c| above(c)), cap);
            if picker.picked.is_empty() {
                debug!("No candidate above {threshold}, using best available");
                picker.take(candidates.iter(), cap);
            }
        }
        picker.picked
    }

    /// Format selected candidates into ranked blocks, signing URLs concurrently.
    ///
    /// A failed or slow signing call leaves that block without `accessUrl`.
    pub async fn format(&self, selected: &[ScoredCandidate]) -> Vec<FormattedImageBlock> {
        let blocks = selected
            .iter()
            .enumerate()
            .map(|(idx, candidate)| self.format_one(idx + 1, candidate));
        join_all(blocks).await
    }

    /// `select` then `format`
    pub async fn assemble(&self, candidates: Vec<ScoredCandidate>) -> Vec<FormattedImageBlock> {
        let selected = self.select(candidates);
        self.format(&selected).await
    }

    async fn format_one(&self, rank: usize, candidate: &ScoredCandidate) -> FormattedImageBlock {
        let record = &candidate.source_record;
        let description = record
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map_or_else(
                || {
                    if record.value.trim().is_empty() {
                        "Image".to_string()
                    } else {
                        truncate_str(&record.value, DESCRIPTION_FALLBACK_CHARS)
                    }
                },
                ToString::to_string,
            );

        let (access_url, direct_url) = self.resolve_urls(&candidate.canonical_uri).await;
        let (question, answer) = candidate
            .qa
            .clone()
            .map_or((None, None), |(q, a)| (Some(q), Some(a)));

        FormattedImageBlock {
            description,
            uri: candidate.canonical_uri.clone(),
            relevance_score: candidate.score,
            rank,
            access_url,
            direct_url,
            matched_terms: candidate.matched_terms.clone(),
            is_qa_image: candidate.is_qa(),
            question,
            answer,
            source_pdf_uri: candidate.source_pdf_uri.clone(),
        }
    }

    async fn resolve_urls(&self, uri: &str) -> (Option<String>, Option<String>) {
        if !uri.starts_with("s3://") {
            let is_http = uri.starts_with("http://") || uri.starts_with("https://");
            return (None, is_http.then(|| uri.to_string()));
        }

        let Some(location) = S3Location::parse(uri) else {
            warn!("Empty bucket or key in image URI {}, not signing", uri);
            return (None, None);
        };

        let direct_url = self.blobs.direct_url(&location.bucket, &location.key);
        let signing = self
            .blobs
            .sign_access_url(&location.bucket, &location.key, self.options.url_ttl);

        let access_url = match tokio::time::timeout(self.options.signing_timeout, signing).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(e)) => {
                warn!("Failed to sign access URL for {}: {}", uri, e);
                None
            }
            Err(_) => {
                warn!(
                    "Signing access URL for {} timed out after {:?}",
                    uri, self.options.signing_timeout
                );
                None
            }
        };
        (access_url, direct_url)
    }
}

#[derive(Default)]
struct Picker {
    picked: Vec<ScoredCandidate>,
    emitted: HashSet<String>,
}

impl Picker {
    fn take<'a>(&mut self, candidates: impl Iterator<Item = &'a ScoredCandidate>, cap: usize) {
        for candidate in candidates {
            if self.picked.len() >= cap {
                break;
            }
            if self.emitted.insert(candidate.canonical_uri.clone()) {
                self.picked.push(candidate.clone());
            }
        }
    }
}

/// Answer, intro, then a caption block before each image block.
///
/// The intro is omitted when there are no images.
pub fn interleave(answer: &str, images: &[FormattedImageBlock]) -> Vec<ContentBlock> {
    let mut blocks = Vec::with_capacity(2 + images.len() * 2);
    blocks.push(ContentBlock::text(answer));

    if images.is_empty() {
        return blocks;
    }

    let plural = if images.len() == 1 { "" } else { "s" };
    blocks.push(ContentBlock::text(format!(
        "I found {} relevant image{} related to your question:",
        images.len(),
        plural
    )));

    for image in images {
        let caption = if image.is_qa_image {
            format!(
                "Image {} is linked to this question and answer:\nQuestion: {}\nAnswer: {}",
                image.rank,
                image.question.as_deref().unwrap_or_default(),
                image.answer.as_deref().unwrap_or_default()
            )
        } else {
            format!(
                "Image {}: {} (relevance score: {:.2})",
                image.rank, image.description, image.relevance_score
            )
        };
        blocks.push(ContentBlock::text(caption));
        blocks.push(ContentBlock::Image(image.clone()));
    }
    blocks
}
