//! Question answering from the command line

use tracing::debug;

use crate::cli::output::*;
use crate::rag::AnswerService;
use crate::AppConfig;
use crate::Result;

pub async fn handle_query_command(config: &AppConfig, query: &str, json: bool) -> Result<()> {
    let service = AnswerService::from_config(config).await?;
    let response = service.answer(query).await?;
    debug!("Query returned {} images", response.images.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_query_response(&response);
    }
    Ok(())
}
