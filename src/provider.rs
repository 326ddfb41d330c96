//! Analysis provider boundary.
//!
//! [`AnalysisProvider`] is the seam the scheduler drives: exactly one
//! logical request per call, no internal batching, no internal retry.
//! Retry policy belongs to the caller. [`OllamaVisionProvider`] is the
//! shipped implementation, targeting an Ollama vision model.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ProviderError;
use crate::parse;
use crate::types::AnalysisResult;

/// Fixed instruction payload sent with every analysis request.
///
/// This content is a product-level contract, not a per-call parameter:
/// the scheduler may not vary it.
const INSTRUCTION: &str = r#"You are a marketing metadata assistant. Analyze the provided image and return a single JSON object with exactly these fields:

{
  "taglines": [...],
  "keywords": [{"word": "...", "relevance": 1-100, "platforms": [...]}],
  "description": "...",
  "platforms": [...]
}

Requirements:
- "taglines": exactly 10 marketing taglines spanning distinct tonal registers: playful, sophisticated, urgent, inspirational, minimalist, and storytelling.
- "keywords": exactly 50 keywords. Score "relevance" from 1 (marginal) to 100 (essential) based on how central the concept is to the image. Tag each keyword with the stock platforms it performs best on, choosing a non-empty subset of ["AdobeStock", "Shutterstock", "Freepik"].
- "description": one sentence capturing the mood and atmosphere of the image.
- "platforms": up to 3 social platforms this image is best suited for.

Return ONLY the JSON object, no surrounding text."#;

/// Drives one analysis for one normalized payload.
///
/// Implementations must be cheap to share: the scheduler calls `analyze`
/// from several workers at once, against different payloads.
pub trait AnalysisProvider: Send + Sync + 'static {
    /// Analyze one encoded image. Exactly one logical request per call.
    fn analyze(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<AnalysisResult, ProviderError>> + Send;
}

impl<P: AnalysisProvider> AnalysisProvider for Arc<P> {
    fn analyze(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<AnalysisResult, ProviderError>> + Send {
        (**self).analyze(payload)
    }
}

/// Generation options forwarded to Ollama.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Maximum tokens to generate. The full metadata object is long;
    /// keep this generous.
    pub num_predict: u32,
    pub repeat_penalty: f32,
    pub repeat_last_n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_predict: 4096,
            repeat_penalty: 1.1,
            repeat_last_n: 128,
            temperature: None,
            top_p: None,
        }
    }
}

/// Configuration for [`OllamaVisionProvider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Ollama API endpoint (e.g., "http://localhost:11434")
    pub endpoint: String,
    /// Vision model name (e.g., "llava", "minicpm-v")
    pub model: String,
    /// Request timeout (default: 120s)
    pub timeout: Duration,
    pub options: GenerateOptions,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llava".to_string(),
            timeout: Duration::from_secs(120),
            options: GenerateOptions::default(),
        }
    }
}

impl ProviderConfig {
    /// Create a config with the given model name.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Ollama-backed analysis provider.
#[derive(Debug, Clone)]
pub struct OllamaVisionProvider {
    client: Client,
    config: ProviderConfig,
}

impl OllamaVisionProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }
}

impl AnalysisProvider for OllamaVisionProvider {
    async fn analyze(&self, payload: &[u8]) -> Result<AnalysisResult, ProviderError> {
        let image_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, payload);

        let body = json!({
            "model": self.config.model,
            "prompt": INSTRUCTION,
            "images": [image_b64],
            "stream": false,
            "format": "json",
            "options": self.config.options,
        });

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Transport(format!("{}: {}", self.config.endpoint, e))
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let envelope: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = envelope
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        parse::parse_analysis(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::with_model("minicpm-v")
            .endpoint("http://ollama.local:11434")
            .timeout(Duration::from_secs(30));
        assert_eq!(config.model, "minicpm-v");
        assert_eq!(config.endpoint, "http://ollama.local:11434");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_generate_options_skip_unset_sampling() {
        let json = serde_json::to_string(&GenerateOptions::default()).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("top_p"));
    }
}
