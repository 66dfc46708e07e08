//! Chat widget relay to the generative-language API.
//!
//! The widget posts a question; this module assembles the prompt (optionally
//! augmented with rows from the content store), walks the configured API keys
//! in order until one answers, and defensively unwraps the provider's nested
//! response shape. Failures never surface as errors to the visitor: the
//! widget falls back to a fixed message instead.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{AppError, AppResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shown whenever the provider cannot be reached or answers in an
/// unrecognized shape.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I couldn't reach the climate knowledge service just now. Please try again in a moment.";

const DEFAULT_SYSTEM_PROMPT: &str = "You are ClimateWise, an AI assistant specialized in Ghana's \
climate information. You provide accurate information about Ghana's climate change challenges, \
adaptation strategies, and climate policies, including the Nationally Determined Contributions \
(NDCs) and local adaptation initiatives. Keep answers specific to Ghana's climate context, \
grounded in accurate data, and actionable for Ghanaian communities.";

/// Operator-tunable widget settings, edited from the admin area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub system_prompt: String,
    /// Prepend recent climate content rows to the prompt.
    pub use_climate_content: bool,
    /// Mention configured external data sources in the prompt context.
    pub use_external_sources: bool,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            use_climate_content: true,
            use_external_sources: true,
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }
}

impl ChatSettings {
    pub fn validate(&self) -> AppResult<()> {
        if self.system_prompt.trim().is_empty() {
            return Err(AppError::validation("system_prompt_required", "system prompt must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::validation("temperature_range", "temperature must be between 0 and 2"));
        }
        if self.max_output_tokens == 0 {
            return Err(AppError::validation("max_tokens_range", "max output tokens must be positive"));
        }
        Ok(())
    }
}

/// Process-local settings cell; the admin screen writes, the widget reads.
pub type SharedChatSettings = RwLock<ChatSettings>;

/// A snippet of reference material pulled from the content store.
#[derive(Debug, Clone)]
pub struct ContextSnippet {
    pub title: String,
    pub body: String,
}

/// Assemble the full prompt: system instructions, optional reference
/// material, then the visitor's question.
pub fn build_prompt(settings: &ChatSettings, question: &str, context: &[ContextSnippet]) -> String {
    let mut prompt = String::with_capacity(settings.system_prompt.len() + question.len() + 256);
    prompt.push_str(&settings.system_prompt);
    if !context.is_empty() {
        prompt.push_str("\n\nReference material:\n");
        for snippet in context {
            prompt.push_str("- ");
            prompt.push_str(&snippet.title);
            prompt.push_str(": ");
            // Keep each snippet short so the question stays prominent
            let body: String = snippet.body.chars().take(600).collect();
            prompt.push_str(&body);
            prompt.push('\n');
        }
    }
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt
}

/// Pull the generated text out of the provider's nested response shape.
/// Returns None when the shape is unrecognized or the text is empty.
pub fn extract_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct ChatClient {
    endpoint: String,
    model: String,
    keys: Vec<String>,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(endpoint: &str, model: &str, keys: Vec<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AppError::from)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            keys,
            http,
        })
    }

    fn generate_url(&self, key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, key
        )
    }

    /// Ask the provider, walking the configured keys in order. The error of
    /// the last attempt is returned once every key has failed.
    pub async fn generate(&self, prompt: &str, settings: &ChatSettings) -> AppResult<String> {
        if self.keys.is_empty() {
            return Err(AppError::unknown("chat_unconfigured", "no generative API keys configured"));
        }
        let mut last = AppError::unknown("chat_failed", "no attempt made");
        for (attempt, key) in self.keys.iter().enumerate() {
            match self.try_generate(key, prompt, settings).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("generative call failed on key {}: {e}", attempt + 1);
                    last = e;
                }
            }
        }
        Err(last)
    }

    async fn try_generate(&self, key: &str, prompt: &str, settings: &ChatSettings) -> AppResult<String> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": settings.temperature,
                "maxOutputTokens": settings.max_output_tokens,
            },
        });
        let resp = self.http.post(self.generate_url(key)).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, "generateContent"));
        }
        let body: serde_json::Value = resp.json().await?;
        extract_text(&body)
            .ok_or_else(|| AppError::unknown("unrecognized_response", "provider response had no text"))
    }
}
