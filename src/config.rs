use std::env;
use std::str::FromStr;

use crate::prompt::{missing_placeholders, DEFAULT_PROMPT_TEMPLATE};

#[derive(Clone, Debug)]
pub struct BedrockConfig {
    pub region: String,
    pub knowledge_base_id: String,
    pub model_arn: String,
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GenerationSettings {
    pub prompt_template: String,
    pub top_k: usize,
    pub max_tokens: usize,
    pub temperature: f32,
    pub max_concurrent: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            top_k: 4,
            max_tokens: 600,
            temperature: 0.2,
            max_concurrent: 4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub bedrock: BedrockConfig,
    pub generation: GenerationSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-west-2".to_string());
        let defaults = GenerationSettings::default();

        let prompt_template =
            env::var("CHATBOT_PROMPT_TEMPLATE").unwrap_or(defaults.prompt_template);
        for marker in missing_placeholders(&prompt_template) {
            tracing::warn!("prompt template is missing the {marker} placeholder");
        }

        Self {
            bind_addr: env::var("KB_CHATBOT_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            bedrock: BedrockConfig {
                endpoint: env::var("BEDROCK_AGENT_RUNTIME_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| default_endpoint(&region)),
                knowledge_base_id: env::var("BEDROCK_KB_ID")
                    .unwrap_or_else(|_| "7DUKWTRFX3".to_string()),
                model_arn: env::var("BEDROCK_MODEL_ARN")
                    .unwrap_or_else(|_| "us.deepseek.r1-v1:0".to_string()),
                api_key: env::var("AWS_BEARER_TOKEN_BEDROCK")
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                region,
            },
            generation: GenerationSettings {
                prompt_template,
                top_k: parse_or(env::var("RAG_TOP_K").ok(), defaults.top_k),
                max_tokens: parse_or(env::var("MAX_OUTPUT_TOKENS").ok(), defaults.max_tokens),
                temperature: parse_or(
                    env::var("GENERATION_TEMPERATURE").ok(),
                    defaults.temperature,
                ),
                max_concurrent: parse_or(
                    env::var("MAX_CONCURRENT_GENERATIONS").ok(),
                    defaults.max_concurrent,
                )
                .max(1),
            },
        }
    }
}

pub fn default_endpoint(region: &str) -> String {
    format!("https://bedrock-agent-runtime.{region}.amazonaws.com")
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
