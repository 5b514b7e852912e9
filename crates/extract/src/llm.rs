use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::CompletionError;

/// One item of context sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItem {
    Text(String),
    /// A file already uploaded to the service. Only `name` identifies it for caching.
    File {
        name: String,
        uri: String,
        mime_type: String,
    },
}

impl ContextItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContextItem::Text(text.into())
    }

    /// Text that stands for this item in the cache key
    pub fn key_fragment(&self) -> &str {
        match self {
            ContextItem::Text(text) => text,
            ContextItem::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub context: Vec<ContextItem>,
}

/// Text-in/text-out boundary to the generative model.
///
/// Implementations return the raw reply body; pulling the JSON payload out of
/// whatever envelope the provider wraps it in is the parser's job.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    fn name(&self) -> &str;
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn check_status(response: reqwest::Response) -> Result<String, CompletionError> {
    let status = response.status();

    if status.as_u16() == 429 {
        return Err(CompletionError::RateLimited {
            retry_after: retry_after(&response),
        });
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Err(CompletionError::EmptyReply);
    }

    Ok(body)
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            model,
            client,
        }
    }

    pub fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
            Duration::from_secs(120),
        )
    }

    /// Ollama takes a single prompt string; files are referenced by name only.
    fn flatten(request: &CompletionRequest) -> String {
        let mut prompt = request.prompt.clone();
        for item in &request.context {
            prompt.push_str("\n\n");
            match item {
                ContextItem::Text(text) => prompt.push_str(text),
                ContextItem::File { name, .. } => {
                    prompt.push_str(&format!("[attached file: {}]", name))
                }
            }
        }
        prompt
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: Self::flatten(request),
            stream: false,
            format: "json".to_string(), // Force JSON output
        };

        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            model,
            api_key,
            client,
        }
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        for item in &request.context {
            parts.push(match item {
                ContextItem::Text(text) => json!({ "text": text }),
                ContextItem::File { uri, mime_type, .. } => json!({
                    "file_data": { "file_uri": uri, "mime_type": mime_type }
                }),
            });
        }

        json!({ "contents": [{ "role": "user", "parts": parts }] })
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await?;

        // The raw envelope goes back as-is; the parser unwraps `candidates`.
        check_status(response).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "Extract tables.".to_string(),
            context: vec![
                ContextItem::text("Table 1: assays"),
                ContextItem::File {
                    name: "zeta.pdf".to_string(),
                    uri: "files/abc123".to_string(),
                    mime_type: "application/pdf".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_ollama_flatten_keeps_order() {
        let prompt = OllamaClient::flatten(&request());
        assert_eq!(
            prompt,
            "Extract tables.\n\nTable 1: assays\n\n[attached file: zeta.pdf]"
        );
    }

    #[test]
    fn test_gemini_body_parts() {
        let body = GeminiClient::request_body(&request());
        let parts = body["contents"][0]["parts"].as_array().unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "Extract tables.");
        assert_eq!(parts[2]["file_data"]["file_uri"], "files/abc123");
    }

    #[test]
    fn test_file_key_fragment_is_name() {
        let item = ContextItem::File {
            name: "zeta.pdf".to_string(),
            uri: "files/one".to_string(),
            mime_type: "application/pdf".to_string(),
        };
        assert_eq!(item.key_fragment(), "zeta.pdf");
    }
}
