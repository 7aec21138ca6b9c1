//! CLI output formatting utilities

use crate::capabilities::Capabilities;
use crate::ingest::IndexSummary;
use crate::ingest::IngestReport;
use crate::models::ContentBlock;
use crate::models::QueryResponse;
use crate::text::truncate_str;
use crate::AppConfig;

/// Print an answer with its interleaved image captions
pub fn print_query_response(response: &QueryResponse) {
    println!("❓ {}", response.query);
    println!();

    for block in &response.structured_response {
        match block {
            ContentBlock::Text { text } => {
                println!("{text}");
                println!();
            }
            ContentBlock::Image(image) => {
                let url = image
                    .access_url
                    .as_deref()
                    .or(image.direct_url.as_deref())
                    .unwrap_or(&image.uri);
                println!("  🖼️  {url}");
                if let Some(pdf) = &image.source_pdf_uri {
                    println!("     from {pdf}");
                }
                if !image.matched_terms.is_empty() {
                    println!("     matched: {}", image.matched_terms.join(", "));
                }
                println!();
            }
        }
    }

    if response.sources.is_empty() {
        print_warning("No knowledge base passages matched");
    } else {
        println!("📚 Sources:");
        for source in &response.sources {
            println!("  - {}", truncate_str(source, 120));
        }
    }
}

pub fn print_index_summary(summary: &IndexSummary) {
    print_success(&format!(
        "Indexed {} ({} records, {} failed)",
        summary.document_id, summary.records_written, summary.records_failed
    ));
    for (kind, count) in &summary.per_kind {
        println!("  - {kind}: {count}");
    }
}

pub fn print_ingest_report(report: &IngestReport) {
    print_success(&format!(
        "Ingested {} ({} records, {} failed)",
        report.document_id, report.records_written, report.records_failed
    ));
    println!(
        "  processed: s3://{}/{}",
        report.processed.processed_bucket, report.processed.processed_key
    );
    match &report.knowledge_base {
        Some(sync) => match sync.job_id() {
            Some(job_id) => println!("  knowledge base: {} (job {job_id})", sync.status()),
            None => println!("  knowledge base: {}", sync.status()),
        },
        None => print_warning("Knowledge base not updated"),
    }
}

/// Print configuration
pub fn print_config(config: &AppConfig, capabilities: &Capabilities) {
    println!("📋 docrag Configuration:");
    println!();

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  Backtrace: {}", config.logging.backtrace);
    println!();

    println!("🤖 LLM:");
    println!("  Endpoint: {}", config.llm_endpoint());
    println!("  Key: {}", mask_secret(config.llm_key()));
    println!("  Model: {}", config.llm_model());
    println!("  Vision model: {}", config.llm.vision_model);
    println!();

    println!("🗄️  Storage:");
    println!("  Backend: {}", config.storage.backend);
    println!("  Region: {}", config.storage.region);
    println!("  Metadata table: {}", config.storage.metadata_table);
    println!("  Search index table: {}", config.search_index_table());
    println!("  Processed bucket: {}", config.storage.processed_bucket);
    println!("  Payload bucket: {}", config.storage.payload_bucket);
    println!("  Snapshot: {}", config.storage.snapshot_path);
    println!();

    println!("📚 Knowledge base:");
    println!("  ID: {}", config.knowledge_base.id);
    println!("  Data source: {}", config.knowledge_base.data_source_id);
    println!("  Search backend: {}", config.knowledge_base.search_backend);
    println!();

    println!("🎯 Retrieval:");
    println!("  Relevance threshold: {}", config.retrieval.relevance_threshold);
    println!("  Top K: {} (Q&A: {})", config.retrieval.top_k, config.retrieval.qa_top_k);
    println!("  Q&A-aware scoring: {}", config.retrieval.qa_aware_scoring);
    println!("  URL TTL: {}s", config.retrieval.url_ttl_secs);
    println!();

    println!("⏱️  Timeouts:");
    println!("  Query: {}ms", config.timeouts.query_timeout_ms);
    println!("  Generation: {}ms", config.timeouts.generation_timeout_ms);
    println!("  Signing: {}ms", config.timeouts.signing_timeout_ms);
    println!();

    println!("🔌 Resolved: {}", capabilities.summary());
    for fallback in &capabilities.fallbacks {
        print_warning(fallback);
    }
}

/// Keep the first four characters of a secret
fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}

pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    eprintln!("❌ {msg}");
}
