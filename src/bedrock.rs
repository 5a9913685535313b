use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

use crate::config::{BedrockConfig, GenerationSettings};
use crate::models::GenerationResult;

/// Client for the knowledge-base retrieve-and-generate API.
#[derive(Clone)]
pub struct BedrockClient {
    client: Client,
    config: BedrockConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveAndGenerateReq<'a> {
    input: InputText<'a>,
    retrieve_and_generate_configuration: RetrieveAndGenerateConfig<'a>,
}

#[derive(Serialize)]
struct InputText<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveAndGenerateConfig<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    knowledge_base_configuration: KnowledgeBaseConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseConfig<'a> {
    knowledge_base_id: &'a str,
    model_arn: &'a str,
    retrieval_configuration: RetrievalConfig,
    generation_configuration: GenerationConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    vector_search_configuration: VectorSearchConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchConfig {
    number_of_results: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_template: Option<PromptTemplate<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    text_inference_config: TextInferenceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextInferenceConfig {
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptTemplate<'a> {
    text_prompt_template: &'a str,
}

impl BedrockClient {
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn knowledge_base_id(&self) -> &str {
        &self.config.knowledge_base_id
    }

    pub async fn retrieve_and_generate(
        &self,
        question: &str,
        settings: &GenerationSettings,
    ) -> Result<GenerationResult> {
        let question = question.trim();
        if question.is_empty() {
            anyhow::bail!("cannot send an empty question to retrieve-and-generate");
        }

        tracing::info!(
            question = %crate::render::preview(question, 100),
            top_k = settings.top_k,
            max_tokens = settings.max_tokens,
            temperature = settings.temperature,
            "sending question to retrieve-and-generate"
        );

        let url = format!("{}/retrieveAndGenerate", self.config.endpoint);
        let mut request = self
            .client
            .post(url)
            .json(&build_request(&self.config, question, settings));
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .context("failed to call retrieve-and-generate endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "retrieve-and-generate returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let result = response
            .json::<GenerationResult>()
            .await
            .context("failed to decode retrieve-and-generate response")?;

        tracing::info!(
            answer_chars = result.answer_text().chars().count(),
            raw_citations = result.citations.len(),
            "received retrieve-and-generate response"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(raw) = serde_json::to_string_pretty(&result) {
                tracing::trace!("retrieve-and-generate payload: {raw}");
            }
        }

        Ok(result)
    }
}

fn build_request<'a>(
    config: &'a BedrockConfig,
    question: &'a str,
    settings: &'a GenerationSettings,
) -> RetrieveAndGenerateReq<'a> {
    let prompt_template = Some(settings.prompt_template.as_str())
        .filter(|template| !template.trim().is_empty())
        .map(|text_prompt_template| PromptTemplate {
            text_prompt_template,
        });

    RetrieveAndGenerateReq {
        input: InputText { text: question },
        retrieve_and_generate_configuration: RetrieveAndGenerateConfig {
            kind: "KNOWLEDGE_BASE",
            knowledge_base_configuration: KnowledgeBaseConfig {
                knowledge_base_id: &config.knowledge_base_id,
                model_arn: &config.model_arn,
                retrieval_configuration: RetrievalConfig {
                    vector_search_configuration: VectorSearchConfig {
                        number_of_results: settings.top_k,
                    },
                },
                generation_configuration: GenerationConfig {
                    inference_config: InferenceConfig {
                        text_inference_config: TextInferenceConfig {
                            max_tokens: settings.max_tokens,
                            temperature: settings.temperature,
                        },
                    },
                    prompt_template,
                },
            },
        },
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = json
            .get("message")
            .or_else(|| json.get("Message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bedrock_config() -> BedrockConfig {
        BedrockConfig {
            region: "us-west-2".to_string(),
            knowledge_base_id: "KB123".to_string(),
            model_arn: "us.deepseek.r1-v1:0".to_string(),
            endpoint: "http://127.0.0.1:9".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn request_body_matches_service_shape() {
        let config = bedrock_config();
        let settings = GenerationSettings {
            prompt_template: "Q: $query$".to_string(),
            top_k: 6,
            max_tokens: 300,
            temperature: 0.5,
            max_concurrent: 1,
        };

        let body = serde_json::to_value(build_request(&config, "What is RAG?", &settings)).unwrap();
        let kb = &body["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"];

        assert_eq!(body["input"]["text"], "What is RAG?");
        assert_eq!(body["retrieveAndGenerateConfiguration"]["type"], "KNOWLEDGE_BASE");
        assert_eq!(kb["knowledgeBaseId"], "KB123");
        assert_eq!(kb["modelArn"], "us.deepseek.r1-v1:0");
        assert_eq!(
            kb["retrievalConfiguration"]["vectorSearchConfiguration"]["numberOfResults"],
            6
        );
        assert_eq!(
            kb["generationConfiguration"]["inferenceConfig"]["textInferenceConfig"]["maxTokens"],
            300
        );
        assert_eq!(
            kb["generationConfiguration"]["promptTemplate"]["textPromptTemplate"],
            "Q: $query$"
        );
    }

    #[test]
    fn blank_template_is_omitted() {
        let config = bedrock_config();
        let settings = GenerationSettings {
            prompt_template: "  ".to_string(),
            ..GenerationSettings::default()
        };

        let body = serde_json::to_value(build_request(&config, "q", &settings)).unwrap();
        let generation =
            &body["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"]
                ["generationConfiguration"];
        assert!(generation.get("promptTemplate").is_none());
    }

    #[test]
    fn error_body_prefers_service_message() {
        assert_eq!(
            normalize_err_body(r#"{"message":"Access denied"}"#),
            "Access denied"
        );
        assert_eq!(normalize_err_body("  "), "<empty body>");
        assert_eq!(normalize_err_body("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_call() {
        let client = BedrockClient::new(bedrock_config());
        let err = client
            .retrieve_and_generate("   ", &GenerationSettings::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty question"));
    }
}
