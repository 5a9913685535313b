use std::net::SocketAddr;

use anyhow::Result;
use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::chat::{ChatService, GENERIC_FAILURE_MESSAGE, WELCOME_MESSAGE};
use crate::citations::{collate_sources, reconcile};
use crate::config::AppConfig;
use crate::models::{ChatAnswer, ChatRequest, GenerationResult, PanelRequest, ReconcileResponse};
use crate::render::CitationPanel;

#[derive(Clone)]
struct AppState {
    chat: ChatService,
}

pub async fn run_server(config: AppConfig, chat_service: ChatService) -> Result<()> {
    let app = router(chat_service);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(chat_service: ChatService) -> Router {
    let state = AppState { chat: chat_service };

    Router::new()
        .route("/", get(index_page))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/chat", post(chat_handler))
        .route("/api/reconcile", post(reconcile_handler))
        .route("/api/panel", post(panel_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_page() -> Result<Html<String>, ApiError> {
    let template = IndexTemplate {
        welcome: WELCOME_MESSAGE,
    };
    Ok(Html(template.render()?))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request("question must not be empty"));
    }

    match state.chat.answer(request).await {
        Ok(answer) => Ok(Json(answer)),
        Err(err) => {
            tracing::error!("failed to answer question: {err:#}");
            Err(ApiError::upstream(&err))
        }
    }
}

async fn reconcile_handler(Json(result): Json<GenerationResult>) -> Json<ReconcileResponse> {
    let citations = reconcile(&result);
    let sources = collate_sources(&citations);
    Json(ReconcileResponse { citations, sources })
}

async fn panel_handler(Json(request): Json<PanelRequest>) -> Result<Html<String>, ApiError> {
    let panel = CitationPanel::new(&request.answer_text, &request.citations);
    Ok(Html(panel.render()?))
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    welcome: &'static str,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            detail: None,
        }
    }

    fn upstream(err: &anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: GENERIC_FAILURE_MESSAGE.to_string(),
            detail: Some(format!("{err:#}")),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
            detail: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = match self.detail {
            Some(detail) => serde_json::json!({ "error": self.message, "detail": detail }),
            None => serde_json::json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    use super::*;
    use crate::bedrock::BedrockClient;
    use crate::config::{BedrockConfig, GenerationSettings};

    fn test_router() -> Router {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            bedrock: BedrockConfig {
                region: "us-west-2".to_string(),
                knowledge_base_id: "KB".to_string(),
                model_arn: "model".to_string(),
                endpoint: "http://127.0.0.1:9".to_string(),
                api_key: None,
            },
            generation: GenerationSettings::default(),
        };
        let client = BedrockClient::new(config.bedrock.clone());
        router(ChatService::new(config, client, Arc::new(Semaphore::new(1))))
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn reconcile_route_returns_citations_and_sources() {
        let payload = json!({
            "output": { "text": "Cosine similarity compares vectors." },
            "citations": [
                {
                    "generatedResponsePart": {
                        "textResponsePart": { "text": "Cosine similarity compares vectors." }
                    },
                    "retrievedReferences": [
                        {
                            "location": { "s3Location": { "uri": "s3://workshop/similarity.md" } },
                            "content": { "text": "Cosine similarity measures the angle." }
                        },
                        { "content": { "text": "no locator" } }
                    ]
                },
                { "retrievedReferences": [] }
            ]
        });

        let response = test_router()
            .oneshot(json_request("/api/reconcile", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["citations"].as_array().unwrap().len(), 1);
        assert_eq!(body["citations"][0]["citation_index"], 1);
        assert_eq!(body["citations"][0]["span_end"], 35);
        assert_eq!(body["sources"], json!(["s3://workshop/similarity.md"]));
    }

    #[tokio::test]
    async fn panel_route_renders_notice_for_empty_list() {
        let response = test_router()
            .oneshot(json_request(
                "/api/panel",
                json!({ "answer_text": "answer", "citations": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response)
            .await
            .contains(crate::render::NO_CITATIONS_NOTICE));
    }

    #[tokio::test]
    async fn empty_question_is_a_bad_request() {
        let response = test_router()
            .oneshot(json_request("/api/chat", json!({ "question": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_bad_gateway() {
        let response = test_router()
            .oneshot(json_request("/api/chat", json!({ "question": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);
        assert!(!body["detail"].as_str().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn index_page_shows_welcome() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("educational assistant"));
    }
}
