//! Index Scanner: collects image-bearing records across kinds

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::Result;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::storage::IndexStore;
use crate::storage::ScanFilter;

/// Upper bound on pages read for one kind and filter
pub const MAX_SCAN_PAGES: usize = 1_000;

/// What a scan found, including how it degraded
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Union over kinds; the same image may appear under several kinds
    pub records: Vec<IndexRecord>,
    pub per_kind: BTreeMap<&'static str, usize>,
    /// Kinds whose scan failed and were skipped
    pub failed_kinds: Vec<IndexKind>,
    /// Kinds that needed the kind-only fallback scan
    pub fallback_kinds: Vec<IndexKind>,
    /// Kinds cut off by the deadline; their records so far are kept
    pub timed_out_kinds: Vec<IndexKind>,
}

impl ScanReport {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.failed_kinds.is_empty() || !self.timed_out_kinds.is_empty()
    }
}

/// Records read for one kind
#[derive(Debug, Default)]
struct KindScan {
    records: Vec<IndexRecord>,
    used_fallback: bool,
    timed_out: bool,
}

/// Reads candidate records from the search index
pub struct IndexScanner {
    store: Arc<dyn IndexStore>,
    kinds: Vec<IndexKind>,
}

impl IndexScanner {
    /// Scanner over every image-bearing kind; Q&A kinds only when `qa_aware`
    pub fn new(store: Arc<dyn IndexStore>, qa_aware: bool) -> Self {
        let kinds = IndexKind::IMAGE_BEARING
            .into_iter()
            .filter(|kind| qa_aware || !kind.is_qa())
            .collect();
        Self { store, kinds }
    }

    #[must_use]
    pub fn kinds(&self) -> &[IndexKind] {
        &self.kinds
    }

    /// Scan every configured kind. Failures are isolated per kind.
    pub async fn scan(&self) -> ScanReport {
        self.scan_kinds(None).await
    }

    /// Scan every configured kind, stopping each one at `deadline`.
    ///
    /// Kinds are scanned concurrently so a slow kind does not hold back the
    /// others. Pages read before the deadline stay in the report.
    pub async fn scan_until(&self, deadline: Instant) -> ScanReport {
        self.scan_kinds(Some(deadline)).await
    }

    async fn scan_kinds(&self, deadline: Option<Instant>) -> ScanReport {
        let scans = self.kinds.iter().map(|&kind| async move {
            (kind, self.scan_kind(kind, deadline).await)
        });

        let mut report = ScanReport::default();
        for (kind, outcome) in join_all(scans).await {
            match outcome {
                Ok(scan) => {
                    if scan.used_fallback {
                        report.fallback_kinds.push(kind);
                    }
                    if scan.timed_out {
                        warn!(
                            "⏱️  Scan of {} records hit the deadline after {} records",
                            kind,
                            scan.records.len()
                        );
                        report.timed_out_kinds.push(kind);
                    }
                    report.per_kind.insert(kind.as_str(), scan.records.len());
                    report.records.extend(scan.records);
                }
                Err(e) => {
                    warn!("⚠️  Scan of {} records failed, skipping: {}", kind, e);
                    report.failed_kinds.push(kind);
                }
            }
        }

        info!(
            "🔍 Scanned {} image records across {} kinds ({} failed, {} via fallback, {} timed out)",
            report.records.len(),
            self.kinds.len(),
            report.failed_kinds.len(),
            report.fallback_kinds.len(),
            report.timed_out_kinds.len()
        );
        report
    }

    async fn scan_kind(&self, kind: IndexKind, deadline: Option<Instant>) -> Result<KindScan> {
        let scan = self
            .scan_all_pages(kind, ScanFilter::KindWithImage, deadline)
            .await?;
        if !scan.records.is_empty() || scan.timed_out {
            return Ok(scan);
        }

        // Older or not-yet-consistent items may lack the indexed image attribute.
        debug!("No {} records with image filter, retrying by kind only", kind);
        let mut scan = self
            .scan_all_pages(kind, ScanFilter::KindOnly, deadline)
            .await?;
        scan.used_fallback = true;
        Ok(scan)
    }

    async fn scan_all_pages(
        &self,
        kind: IndexKind,
        filter: ScanFilter,
        deadline: Option<Instant>,
    ) -> Result<KindScan> {
        let mut scan = KindScan::default();
        let mut seen_tokens = HashSet::new();
        let mut continuation: Option<String> = None;

        for _ in 0..MAX_SCAN_PAGES {
            let request = self
                .store
                .scan_index_records(kind, filter, continuation.clone());
            let page = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, request).await {
                    Ok(page) => page?,
                    Err(_) => {
                        scan.timed_out = true;
                        return Ok(scan);
                    }
                },
                None => request.await?,
            };
            scan.records.extend(page.records);

            match page.continuation {
                None => return Ok(scan),
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    warn!(
                        "⚠️  {} scan returned continuation '{}' twice, stopping",
                        kind, token
                    );
                    return Ok(scan);
                }
                Some(token) => continuation = Some(token),
            }
        }

        warn!(
            "⚠️  {} scan stopped after {} pages with more remaining",
            kind, MAX_SCAN_PAGES
        );
        Ok(scan)
    }
}
