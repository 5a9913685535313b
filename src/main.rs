use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use kb_chatbot::bedrock::BedrockClient;
use kb_chatbot::chat::ChatService;
use kb_chatbot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(
        knowledge_base = %config.bedrock.knowledge_base_id,
        model = %config.bedrock.model_arn,
        region = %config.bedrock.region,
        "starting chatbot"
    );

    let client = BedrockClient::new(config.bedrock.clone());
    let generation_limit = Arc::new(Semaphore::new(config.generation.max_concurrent));
    let chat = ChatService::new(config.clone(), client, generation_limit);

    run_server(config, chat).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
