//! Complete answer pipeline: Search -> Generate, alongside Scan -> Score -> Assemble

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::capabilities::Capabilities;
use crate::capabilities::Collaborators;
use crate::config::AppConfig;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::llm::TextGenerator;
use crate::models::FormattedImageBlock;
use crate::models::KnowledgeBaseConfig;
use crate::models::Passage;
use crate::models::QueryResponse;
use crate::rag::assembler::interleave;
use crate::rag::context::sources;
use crate::rag::prompts::build_answer_prompt;
use crate::rag::prompts::ANSWER_UNAVAILABLE;
use crate::rag::AssemblerOptions;
use crate::rag::ContextAssembler;
use crate::rag::IndexScanner;
use crate::rag::RelevanceScorer;
use crate::rag::ScanReport;
use crate::rag::ResultAssembler;
use crate::storage::IndexStore;
use crate::storage::KnowledgeBase;

/// Limits applied per query
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub passage_limit: usize,
    /// Bounds the knowledge-base search and the image scan plus signing
    pub query_timeout: Duration,
    pub generation_timeout: Duration,
}

impl AnswerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            passage_limit: config.retrieval.passage_limit,
            query_timeout: config.query_timeout(),
            generation_timeout: config.generation_timeout(),
        }
    }
}

/// Question in, answer with ranked images out
pub struct AnswerService {
    index_store: Arc<dyn IndexStore>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    generator: Arc<dyn TextGenerator>,
    scanner: IndexScanner,
    scorer: RelevanceScorer,
    assembler: ResultAssembler,
    context_assembler: ContextAssembler,
    knowledge_base_config: Option<KnowledgeBaseConfig>,
    options: AnswerOptions,
}

impl AnswerService {
    /// Resolve capabilities and build every collaborator from configuration
    ///
    /// # Errors
    /// - Snapshot loading errors for the memory backend
    /// - HTTP client construction errors
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let capabilities = Capabilities::resolve(config);
        let collaborators = Collaborators::build(config, &capabilities).await?;
        Ok(Self::new(
            collaborators,
            &capabilities,
            AssemblerOptions::from_config(config),
            AnswerOptions::from_config(config),
        ))
    }

    /// Create from existing collaborators
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        capabilities: &Capabilities,
        assembler_options: AssemblerOptions,
        options: AnswerOptions,
    ) -> Self {
        let Collaborators {
            index_store,
            blobs,
            knowledge_base,
            generator,
            ..
        } = collaborators;

        Self {
            scanner: IndexScanner::new(index_store.clone(), capabilities.qa_aware_scoring),
            scorer: RelevanceScorer::new(capabilities.qa_aware_scoring),
            assembler: ResultAssembler::new(blobs, assembler_options),
            context_assembler: ContextAssembler::default(),
            knowledge_base_config: capabilities.knowledge_base.clone(),
            index_store,
            knowledge_base,
            generator,
            options,
        }
    }

    /// Answer a question with passages, a generated answer and ranked images
    ///
    /// # Errors
    /// - `InvalidInput` for a missing or blank query
    /// - `MissingConfiguration` when no knowledge base is configured or stored
    /// - Index store errors while looking up the knowledge base configuration
    pub async fn answer(&self, query: &str) -> Result<QueryResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DocRagError::InvalidInput(
                "Missing query parameter".to_string(),
            ));
        }

        let kb_config = self.resolve_knowledge_base().await?;
        info!(
            "❓ Answering query '{}' with knowledge base {}",
            query, kb_config.knowledge_base_id
        );

        let deadline = Instant::now() + self.options.query_timeout;
        let (text, images) = tokio::join!(
            self.generate_answer(query, deadline),
            self.find_images_until(query, deadline)
        );
        let (answer, passages) = text;

        info!(
            "✅ Answered with {} sources and {} images",
            passages.len(),
            images.len()
        );

        Ok(QueryResponse {
            query: query.to_string(),
            structured_response: interleave(&answer, &images),
            answer,
            sources: sources(&passages),
            images,
        })
    }

    /// Ranked image blocks for a query, without answer generation
    pub async fn find_images(&self, query: &str) -> Vec<FormattedImageBlock> {
        let report = self.scanner.scan().await;
        self.rank_images(query, report).await
    }

    /// Ranked image blocks from whatever the index yields before `deadline`.
    ///
    /// Scanning stops one signing budget early; URL signing is bounded per
    /// image by the same budget.
    async fn find_images_until(&self, query: &str, deadline: Instant) -> Vec<FormattedImageBlock> {
        let signing_timeout = self.assembler.options().signing_timeout;
        let scan_deadline = deadline.checked_sub(signing_timeout).unwrap_or(deadline);
        let report = self.scanner.scan_until(scan_deadline).await;
        if !report.timed_out_kinds.is_empty() {
            warn!(
                "⏱️  Image scan exceeded {:?}, ranking {} records found so far",
                self.options.query_timeout,
                report.records.len()
            );
        }
        self.rank_images(query, report).await
    }

    async fn rank_images(&self, query: &str, report: ScanReport) -> Vec<FormattedImageBlock> {
        if !report.failed_kinds.is_empty() {
            warn!(
                "⚠️  Image index partially unavailable: {} kinds failed",
                report.failed_kinds.len()
            );
        }

        let candidates = self.scorer.score_all(query, &report.records);
        debug!("Scored {} image candidates", candidates.len());
        self.assembler.assemble(candidates).await
    }

    async fn generate_answer(&self, query: &str, deadline: Instant) -> (String, Vec<Passage>) {
        let passages = self.search_passages(query, deadline).await;
        let context = self.context_assembler.assemble(&passages);
        let prompt = build_answer_prompt(query, &context);

        debug!("Generating answer with {}", self.generator.name());
        let generation = tokio::time::timeout(
            self.options.generation_timeout,
            self.generator.generate_text(&prompt, None),
        )
        .await;

        let answer = match generation {
            Ok(Ok(answer)) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(Ok(_)) => {
                warn!("⚠️  Generator returned an empty answer");
                ANSWER_UNAVAILABLE.to_string()
            }
            Ok(Err(e)) => {
                warn!("⚠️  Answer generation failed: {}", e);
                ANSWER_UNAVAILABLE.to_string()
            }
            Err(_) => {
                warn!(
                    "⏱️  Answer generation exceeded {:?}",
                    self.options.generation_timeout
                );
                ANSWER_UNAVAILABLE.to_string()
            }
        };

        (answer, passages)
    }

    async fn search_passages(&self, query: &str, deadline: Instant) -> Vec<Passage> {
        let search = self.knowledge_base.search(query, self.options.passage_limit);
        match tokio::time::timeout_at(deadline, search).await {
            Ok(Ok(passages)) => {
                debug!(
                    "Retrieved {} passages from {} search",
                    passages.len(),
                    self.knowledge_base.name()
                );
                passages
            }
            Ok(Err(e)) => {
                warn!("⚠️  Knowledge base search failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("⏱️  Knowledge base search timed out");
                Vec::new()
            }
        }
    }

    async fn resolve_knowledge_base(&self) -> Result<KnowledgeBaseConfig> {
        if let Some(config) = &self.knowledge_base_config {
            return Ok(config.clone());
        }

        self.index_store
            .knowledge_base_config()
            .await?
            .filter(|config| !config.knowledge_base_id.trim().is_empty())
            .ok_or_else(|| {
                DocRagError::MissingConfiguration(
                    "Knowledge base ID not found in configuration".to_string(),
                )
            })
    }
}
