use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payload returned by the retrieve-and-generate call.
///
/// Every nested field is optional. A field that is present with an unexpected
/// JSON type deserializes as absent instead of failing the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub output: Option<GenerationOutput>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub citations: Vec<RawCitation>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl GenerationResult {
    pub fn answer_text(&self) -> &str {
        self.output
            .as_ref()
            .and_then(|output| output.text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCitation {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub generated_response_part: Option<GeneratedResponsePart>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub retrieved_references: Vec<RawReference>,
}

impl RawCitation {
    fn text_part(&self) -> Option<&TextResponsePart> {
        self.generated_response_part
            .as_ref()
            .and_then(|part| part.text_response_part.as_ref())
    }

    pub fn cited_text(&self) -> &str {
        self.text_part()
            .and_then(|part| part.text.as_deref())
            .unwrap_or_default()
    }

    pub fn span_start(&self) -> Option<i64> {
        self.text_part()
            .and_then(|part| part.span.as_ref())
            .and_then(|span| span.start)
    }

    pub fn span_end(&self) -> Option<i64> {
        self.text_part()
            .and_then(|part| part.span.as_ref())
            .and_then(|span| span.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResponsePart {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text_response_part: Option<TextResponsePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextResponsePart {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub span: Option<ResponseSpan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpan {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// One retrieved passage offered as evidence for a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReference {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub location: Option<ReferenceLocation>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub metadata: HashMap<String, Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub content: Option<ReferenceContent>,
}

impl RawReference {
    pub fn content_text(&self) -> &str {
        self.content
            .as_ref()
            .and_then(|content| content.text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLocation {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub s3_location: Option<S3Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3Location {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceContent {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A usable reference: a resolved source identifier and non-empty passage text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCitation {
    pub citation_index: usize,
    pub cited_text: String,
    pub span_start: i64,
    pub span_end: i64,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub answer_text: String,
    pub citations: Vec<NormalizedCitation>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub latency_ms: u128,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub citations: Vec<NormalizedCitation>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelRequest {
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub citations: Vec<NormalizedCitation>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

// Malformed elements become defaults so raw positions stay stable.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

fn lenient_map<'de, D>(deserializer: D) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_citations_field_is_empty() {
        let result: GenerationResult =
            serde_json::from_value(json!({ "output": { "text": "hello" } })).unwrap();
        assert!(result.citations.is_empty());
        assert_eq!(result.answer_text(), "hello");
    }

    #[test]
    fn wrongly_typed_fields_read_as_absent() {
        let result: GenerationResult = serde_json::from_value(json!({
            "output": "not an object",
            "citations": [
                {
                    "generatedResponsePart": {
                        "textResponsePart": { "text": 7, "span": { "start": "zero", "end": 12 } }
                    },
                    "retrievedReferences": [
                        { "metadata": [], "content": { "text": "body" }, "location": 3 }
                    ]
                },
                "garbage"
            ]
        }))
        .unwrap();

        assert_eq!(result.answer_text(), "");
        assert_eq!(result.citations.len(), 2);

        let first = &result.citations[0];
        assert_eq!(first.cited_text(), "");
        assert_eq!(first.span_start(), None);
        assert_eq!(first.span_end(), Some(12));
        assert!(first.retrieved_references[0].metadata.is_empty());
        assert!(first.retrieved_references[0].location.is_none());
        assert_eq!(first.retrieved_references[0].content_text(), "body");

        assert_eq!(result.citations[1], RawCitation::default());
    }

    #[test]
    fn null_citations_read_as_empty() {
        let result: GenerationResult =
            serde_json::from_value(json!({ "citations": null, "sessionId": "abc" })).unwrap();
        assert!(result.citations.is_empty());
        assert_eq!(result.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn normalized_citation_uses_snake_case() {
        let citation = NormalizedCitation {
            citation_index: 1,
            cited_text: "x".to_string(),
            span_start: 0,
            span_end: 1,
            references: vec![Reference {
                source: "s3://bucket/a.pdf".to_string(),
                content: "x".to_string(),
            }],
        };

        let value = serde_json::to_value(&citation).unwrap();
        assert_eq!(value["citation_index"], 1);
        assert_eq!(value["span_end"], 1);
        assert_eq!(value["references"][0]["source"], "s3://bucket/a.pdf");
    }
}
