//! Relevance Scorer: query terms against index records
//!
//! Per record:
//! 1. every term found in the lower-cased value adds the kind weight
//!    (`qaImage` 5, `qaPdfPage` 4, `embeddedImage` 3, `imageContent` 2,
//!    anything else 1); for Q&A kinds a term found in the question adds a
//!    flat 10 once and those terms count as matched
//! 2. density: `matched / (words + 1) * 5`, zero for an empty value
//! 3. phrase adjacency: all terms, space-joined, found verbatim in the value
//!    add `2 * terms` (only for multi-term queries)
//!
//! Contributions accumulate into one candidate per canonical image URI.

use std::collections::HashMap;

use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::text::tokenize_query;
use crate::text::word_count;

const QUESTION_MATCH_BONUS: f64 = 10.0;
const DENSITY_WEIGHT: f64 = 5.0;
const PHRASE_WEIGHT_PER_TERM: f64 = 2.0;

/// Score and matched terms for a single record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordScore {
    pub score: f64,
    pub matched_terms: Vec<String>,
}

/// One image identity with everything that scored for it in this query
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub canonical_uri: String,
    pub score: f64,
    pub matched_terms: Vec<String>,
    /// Record with the most matched terms (ties prefer Q&A kinds, then first seen)
    pub source_record: IndexRecord,
    pub first_seen: usize,
    /// Page URI when a PDF page record resolved to this extracted image
    pub source_pdf_uri: Option<String>,
    /// Question and answer of the first contributing Q&A record
    pub qa: Option<(String, String)>,
}

impl ScoredCandidate {
    #[must_use]
    pub const fn is_qa(&self) -> bool {
        self.qa.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelevanceScorer {
    qa_aware: bool,
}

impl RelevanceScorer {
    pub const fn new(qa_aware: bool) -> Self {
        Self { qa_aware }
    }

    /// Score one record. `None` when nothing matched or the record has no image.
    pub fn score_record(&self, terms: &[String], record: &IndexRecord) -> Option<RecordScore> {
        if terms.is_empty() || !record.has_image() {
            return None;
        }

        let value = record.value.to_lowercase();
        let weight = record.kind.term_weight();
        let mut score = 0.0;
        let mut matched: Vec<String> = Vec::new();

        for term in terms {
            if value.contains(term.as_str()) {
                score += weight;
                matched.push(term.clone());
            }
        }

        if self.qa_aware && record.kind.is_qa() {
            let question = record.question.as_deref().unwrap_or_default().to_lowercase();
            let question_terms: Vec<&String> = terms
                .iter()
                .filter(|t| question.contains(t.as_str()))
                .collect();
            if !question_terms.is_empty() {
                score += QUESTION_MATCH_BONUS;
                for term in question_terms {
                    if !matched.contains(term) {
                        matched.push(term.clone());
                    }
                }
            }
        }

        if !value.trim().is_empty() {
            score += matched.len() as f64 / (word_count(&value) + 1) as f64 * DENSITY_WEIGHT;
        }

        if terms.len() > 1 && value.contains(&terms.join(" ")) {
            score += PHRASE_WEIGHT_PER_TERM * terms.len() as f64;
        }

        (score > 0.0).then_some(RecordScore {
            score,
            matched_terms: matched,
        })
    }

    /// Score every record for `query`, one candidate per canonical URI in
    /// first-seen order
    pub fn score_all(&self, query: &str, records: &[IndexRecord]) -> Vec<ScoredCandidate> {
        let terms = tokenize_query(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut set = CandidateSet::new(records);

        for record in records {
            if let Some(contribution) = self.score_record(&terms, record) {
                set.add(record, contribution);
            }
        }
        set.into_candidates()
    }
}

struct Tracked {
    inner: ScoredCandidate,
    source_record_matches: usize,
}

/// Accumulates per-record scores into per-image candidates
struct CandidateSet {
    candidates: Vec<Tracked>,
    index: HashMap<String, usize>,
    /// extracted image URI → page URI, from every PDF page record scanned
    page_links: HashMap<String, String>,
}

impl CandidateSet {
    fn new(records: &[IndexRecord]) -> Self {
        let page_links = records
            .iter()
            .filter(|r| r.kind == IndexKind::PdfPageImage)
            .filter_map(|r| {
                let extracted = r.extracted_image_uri.as_deref().filter(|u| !u.trim().is_empty())?;
                let page = r.image_uri.as_deref().filter(|u| !u.trim().is_empty())?;
                Some((extracted.to_string(), page.to_string()))
            })
            .collect();

        Self {
            candidates: Vec::new(),
            index: HashMap::new(),
            page_links,
        }
    }

    fn add(&mut self, record: &IndexRecord, contribution: RecordScore) {
        let Some(uri) = record.canonical_image_uri() else {
            return;
        };
        let qa = record.kind.is_qa().then(|| {
            (
                record.question.clone().unwrap_or_default(),
                record.answer.clone().unwrap_or_default(),
            )
        });

        match self.index.get(uri) {
            Some(&idx) => {
                let candidate = &mut self.candidates[idx];
                candidate.inner.score += contribution.score;

                let current_len = candidate.source_record_matches;
                let replace = contribution.matched_terms.len() > current_len
                    || (contribution.matched_terms.len() == current_len
                        && record.kind.is_qa()
                        && !candidate.inner.source_record.kind.is_qa());
                if replace {
                    candidate.inner.source_record = record.clone();
                    candidate.source_record_matches = contribution.matched_terms.len();
                }

                for term in contribution.matched_terms {
                    if !candidate.inner.matched_terms.contains(&term) {
                        candidate.inner.matched_terms.push(term);
                    }
                }
                if candidate.inner.qa.is_none() {
                    candidate.inner.qa = qa;
                }
            }
            None => {
                let first_seen = self.candidates.len();
                let source_pdf_uri = self.page_links.get(uri).cloned();
                self.index.insert(uri.to_string(), first_seen);
                self.candidates.push(Tracked {
                    inner: ScoredCandidate {
                        canonical_uri: uri.to_string(),
                        score: contribution.score,
                        matched_terms: contribution.matched_terms.clone(),
                        source_record: record.clone(),
                        first_seen,
                        source_pdf_uri,
                        qa,
                    },
                    source_record_matches: contribution.matched_terms.len(),
                });
            }
        }
    }

    fn into_candidates(self) -> Vec<ScoredCandidate> {
        self.candidates.into_iter().map(|t| t.inner).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(query: &str) -> Vec<String> {
        tokenize_query(query)
    }

    fn qa_record(value: &str, question: &str, uri: &str) -> IndexRecord {
        IndexRecord::new("faq", IndexKind::QaImage, value)
            .with_image_uri(uri)
            .with_qa(question, "Two years from purchase")
    }

    #[test]
    fn test_question_match_example() {
        let scorer = RelevanceScorer::new(true);
        let record = qa_record("see warranty section", "What is the warranty period?", "s3://b/w.png");
        let score = scorer
            .score_record(&terms("installation warranty"), &record)
            .unwrap();

        assert!(score.score >= 15.0, "score was {}", score.score);
        assert!(score.matched_terms.contains(&"warranty".to_string()));
    }

    #[test]
    fn test_question_bonus_requires_qa_awareness() {
        let record = qa_record("see warranty section", "What is the warranty period?", "s3://b/w.png");
        let aware = RelevanceScorer::new(true)
            .score_record(&terms("warranty"), &record)
            .unwrap();
        let plain = RelevanceScorer::new(false)
            .score_record(&terms("warranty"), &record)
            .unwrap();
        assert!((aware.score - plain.score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_question_only_match_with_empty_value() {
        let record = qa_record("", "How do I reset the router?", "s3://b/r.png");
        let score = RelevanceScorer::new(true)
            .score_record(&terms("router reset"), &record)
            .unwrap();
        // Flat bonus only: no body terms, no density on an empty value
        assert!((score.score - 10.0).abs() < 1e-9);
        assert_eq!(score.matched_terms, vec!["router", "reset"]);
    }

    #[test]
    fn test_empty_value_without_question_is_excluded() {
        let record = IndexRecord::new("d", IndexKind::EmbeddedImage, "").with_image_uri("s3://b/e.png");
        assert!(RelevanceScorer::new(true)
            .score_record(&terms("router reset"), &record)
            .is_none());
    }

    #[test]
    fn test_no_terms_or_no_image_is_excluded() {
        let scorer = RelevanceScorer::new(true);
        let with_image =
            IndexRecord::new("d", IndexKind::EmbeddedImage, "router").with_image_uri("s3://b/1.png");
        assert!(scorer.score_record(&[], &with_image).is_none());
        assert!(scorer.score_all("a an the", &[with_image]).is_empty());

        let no_image = IndexRecord::new("d", IndexKind::EmbeddedImage, "router");
        assert!(scorer.score_record(&terms("router"), &no_image).is_none());
    }

    #[test]
    fn test_density_and_phrase_bonus() {
        let scorer = RelevanceScorer::new(true);
        let record = IndexRecord::new("d", IndexKind::EmbeddedImage, "router reset button")
            .with_image_uri("s3://b/1.png");
        let score = scorer.score_record(&terms("router reset"), &record).unwrap();
        // 2 terms * 3 + 2/(3+1)*5 + 2*2
        assert!((score.score - (6.0 + 2.5 + 4.0)).abs() < 1e-9);

        let single = scorer.score_record(&terms("router"), &record).unwrap();
        // 3 + 1/4*5, no phrase bonus for one term
        assert!((single.score - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_kind_weights_order_equal_text() {
        let scorer = RelevanceScorer::new(true);
        let t = terms("router");
        let score_of = |kind| {
            let record = IndexRecord::new("d", kind, "router").with_image_uri("s3://b/x.png");
            scorer.score_record(&t, &record).unwrap().score
        };
        assert!(score_of(IndexKind::QaImage) > score_of(IndexKind::QaPdfPage));
        assert!(score_of(IndexKind::QaPdfPage) > score_of(IndexKind::EmbeddedImage));
        assert!(score_of(IndexKind::EmbeddedImage) > score_of(IndexKind::ImageContent));
        assert!(score_of(IndexKind::ImageContent) > score_of(IndexKind::PdfPageImage));
    }

    #[test]
    fn test_deterministic() {
        let scorer = RelevanceScorer::new(true);
        let records = vec![
            IndexRecord::new("d", IndexKind::EmbeddedImage, "router wiring").with_image_uri("s3://b/1.png"),
            qa_record("wiring", "Where is the wiring diagram?", "s3://b/2.png"),
        ];
        let a = scorer.score_all("router wiring diagram", &records);
        let b = scorer.score_all("router wiring diagram", &records);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.canonical_uri, y.canonical_uri);
            assert!((x.score - y.score).abs() < f64::EPSILON);
            assert_eq!(x.matched_terms, y.matched_terms);
        }
    }

    #[test]
    fn test_dedup_sums_scores_and_links_pdf_page() {
        let scorer = RelevanceScorer::new(true);
        let page = IndexRecord::new("doc", IndexKind::PdfPageImage, "")
            .with_image_uri("s3://b/doc.pdf#page=3")
            .with_extracted_image_uri("s3://b/img1.png");
        let embedded = IndexRecord::new("doc", IndexKind::EmbeddedImage, "router wiring diagram")
            .with_image_uri("s3://b/img1.png");
        let embedded_again = IndexRecord::new("doc", IndexKind::ImageContent, "wiring")
            .with_image_uri("s3://b/img1.png");

        let candidates = scorer.score_all("wiring diagram", &[page, embedded, embedded_again]);
        assert_eq!(candidates.len(), 1);

        let candidate = &candidates[0];
        assert_eq!(candidate.canonical_uri, "s3://b/img1.png");
        assert_eq!(candidate.source_pdf_uri.as_deref(), Some("s3://b/doc.pdf#page=3"));
        assert_eq!(candidate.source_record.kind, IndexKind::EmbeddedImage);

        let t = terms("wiring diagram");
        let expected: f64 = [
            IndexRecord::new("doc", IndexKind::EmbeddedImage, "router wiring diagram").with_image_uri("s3://b/img1.png"),
            IndexRecord::new("doc", IndexKind::ImageContent, "wiring").with_image_uri("s3://b/img1.png"),
        ]
        .iter()
        .map(|r| scorer.score_record(&t, r).unwrap().score)
        .sum();
        assert!((candidate.score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_source_record_prefers_qa_on_tie() {
        let scorer = RelevanceScorer::new(true);
        let plain = IndexRecord::new("d", IndexKind::EmbeddedImage, "router").with_image_uri("s3://b/1.png");
        let qa = qa_record("router", "Unrelated question", "s3://b/1.png");

        let candidates = scorer.score_all("router", &[plain, qa]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_record.kind, IndexKind::QaImage);
        assert!(candidates[0].is_qa());
        assert_eq!(candidates[0].first_seen, 0);
    }
}
