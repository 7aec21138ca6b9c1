//! Knowledge base backed by a remote retrieve endpoint (vector search)
//!
//! Documents are added by starting an ingestion job on the configured data
//! source; the service syncs the processed bucket on its own schedule.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::KnowledgeBase;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::KnowledgeBaseSync;
use crate::models::Passage;
use crate::models::ProcessedDocument;

/// Client for `POST {endpoint}/knowledgebases/{id}/retrieve`
pub struct HttpKnowledgeBase {
    client: Client,
    endpoint: String,
    knowledge_base_id: String,
    data_source_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
struct RetrievalResult {
    content: RetrievalContent,
    #[serde(default)]
    location: Option<RetrievalLocation>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RetrievalContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalLocation {
    #[serde(default)]
    s3_location: Option<S3Uri>,
}

#[derive(Debug, Deserialize)]
struct S3Uri {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartIngestionJobResponse {
    ingestion_job: IngestionJob,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionJob {
    ingestion_job_id: String,
    #[serde(default)]
    status: String,
}

impl HttpKnowledgeBase {
    /// # Errors
    /// Returns `HttpError` when the HTTP client cannot be built
    pub fn new(
        endpoint: &str,
        knowledge_base_id: &str,
        data_source_id: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            knowledge_base_id: knowledge_base_id.to_string(),
            data_source_id: data_source_id.to_string(),
        })
    }

    fn retrieve_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/retrieve",
            self.endpoint, self.knowledge_base_id
        )
    }

    fn ingestion_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/datasources/{}/ingestionjobs",
            self.endpoint, self.knowledge_base_id, self.data_source_id
        )
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RetrieveRequest<'a> {
            retrieval_query: RetrievalQuery<'a>,
            retrieval_configuration: RetrievalConfiguration,
        }

        #[derive(Serialize)]
        struct RetrievalQuery<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RetrievalConfiguration {
            vector_search_configuration: VectorSearchConfiguration,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct VectorSearchConfiguration {
            number_of_results: usize,
        }

        let request = RetrieveRequest {
            retrieval_query: RetrievalQuery { text: query },
            retrieval_configuration: RetrievalConfiguration {
                vector_search_configuration: VectorSearchConfiguration {
                    number_of_results: limit,
                },
            },
        };

        let url = self.retrieve_url();
        debug!("Retrieving passages from {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocRagError::SearchError(format!(
                "Retrieve API error: {status} - {error_text}"
            )));
        }

        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        Ok(body
            .retrieval_results
            .into_iter()
            .map(|r| Passage {
                text: r.content.text,
                source_uri: r.location.and_then(|l| l.s3_location).map(|s| s.uri),
                score: r.score.unwrap_or_default(),
            })
            .collect())
    }

    async fn add_document(&self, document: &ProcessedDocument) -> Result<KnowledgeBaseSync> {
        if self.data_source_id.trim().is_empty() {
            return Err(DocRagError::MissingConfiguration(
                "knowledge_base.data_source_id is required to ingest documents".to_string(),
            ));
        }

        let url = self.ingestion_url();
        debug!("Starting ingestion job at {} for {}", url, document.document_id);

        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({
                "description": format!("Ingest {}", document.document_id),
            }))
            .send()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocRagError::SearchError(format!(
                "Ingestion job API error: {status} - {error_text}"
            )));
        }

        let body: StartIngestionJobResponse = response
            .json()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        info!(
            "📚 Started ingestion job {} ({}) for {}",
            body.ingestion_job.ingestion_job_id, body.ingestion_job.status, document.document_id
        );
        Ok(KnowledgeBaseSync::Ingesting {
            job_id: body.ingestion_job.ingestion_job_id,
        })
    }

    fn name(&self) -> &'static str {
        "vector"
    }
}
