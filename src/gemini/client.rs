// src/gemini/client.rs
use crate::gemini::models::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::utils::error::GeminiError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
// Large PDFs take a while to tokenize server-side.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Client for the hosted Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, GeminiError> {
        if api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Sends one PDF plus the extraction prompt and returns the model's
    /// field-name → value object. HTTP 429 maps to `RateLimited` so the
    /// driver can back off without burning a retry on a quota blip.
    pub async fn extract_from_pdf(
        &self,
        pdf_path: &Path,
        prompt: &str,
    ) -> Result<Map<String, Value>, GeminiError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|_| GeminiError::PdfRead(pdf_path.to_path_buf()))?;
        tracing::info!(
            "Uploading {} ({} bytes) to Gemini",
            pdf_path.display(),
            bytes.len()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::pdf(BASE64.encode(&bytes)), Part::text(prompt)],
            }],
            generation_config: Some(GenerationConfig {
                temperature: None,
                response_mime_type: Some("application/json".to_string()),
            }),
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        tracing::debug!("POST {}", url.replace(&self.api_key, "***"));

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Gemini quota exceeded (429) for {}", pdf_path.display());
            return Err(GeminiError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error {}: {}", status, body);
            return Err(GeminiError::Http(status));
        }

        let parsed: GenerateContentResponse = response.json().await?;

        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!(
                "Gemini usage - prompt: {:?}, response: {:?}, total: {:?} tokens",
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count
            );
        }

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                GeminiError::InvalidResponse("no candidates in response".to_string())
            })?;

        parse_extraction(&text)
    }
}

/// Strips the markdown code fences the model sometimes wraps around JSON,
/// even when asked not to.
pub(crate) fn clean_json_response(raw: &str) -> String {
    let mut text = raw.trim();
    if text.starts_with("```") {
        if let Some(newline) = text.find('\n') {
            text = &text[newline + 1..];
        }
        if let Some(stripped) = text.trim_end().strip_suffix("```") {
            text = stripped;
        }
    }
    text.trim().to_string()
}

/// Parses the cleaned response text as a JSON object of field → value.
pub(crate) fn parse_extraction(raw: &str) -> Result<Map<String, Value>, GeminiError> {
    let cleaned = clean_json_response(raw);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| GeminiError::InvalidResponse(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(GeminiError::InvalidResponse(format!(
            "expected a JSON object, got: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_empty_api_key() {
        let client = GeminiClient::new("", "gemini-flash-latest");
        assert!(matches!(client.err(), Some(GeminiError::MissingApiKey)));
    }

    #[test]
    fn test_client_creation() {
        assert!(GeminiClient::new("test-key", "gemini-flash-latest").is_ok());
    }

    #[test]
    fn test_clean_json_response_strips_fences() {
        let fenced = "```json\n{\"Study ID\": \"NCT-001\"}\n```";
        assert_eq!(clean_json_response(fenced), "{\"Study ID\": \"NCT-001\"}");
    }

    #[test]
    fn test_clean_json_response_passthrough() {
        assert_eq!(clean_json_response("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_extraction_object() {
        let map = parse_extraction("{\"Study ID\": \"NCT-001\", \"Year\": 2021, \"BMI\": null}")
            .unwrap();
        assert_eq!(map["Study ID"], Value::String("NCT-001".to_string()));
        assert_eq!(map["Year"], Value::from(2021));
        assert!(map["BMI"].is_null());
    }

    #[test]
    fn test_parse_extraction_rejects_non_object() {
        let err = parse_extraction("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, GeminiError::InvalidResponse(_)));

        let err = parse_extraction("not json at all").unwrap_err();
        assert!(matches!(err, GeminiError::InvalidResponse(_)));
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "{\"Year\": 2020}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        let content = parsed.candidates[0].content.as_ref().unwrap();
        assert_eq!(content.parts[0].text, "{\"Year\": 2020}");
        assert_eq!(
            parsed.usage_metadata.as_ref().unwrap().total_token_count,
            Some(15)
        );
    }
}
