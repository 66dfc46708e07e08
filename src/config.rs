//! Process configuration, read once from the environment at startup.
//!
//! Everything the service needs to reach its collaborators lives here: the
//! hosted backend (auth + content + storage), the generative-language API,
//! and the local session cache path. Defaults keep a dev instance runnable
//! against a local backend without any variables set.

use std::path::PathBuf;

const DEFAULT_HTTP_PORT: u16 = 7878;
const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
const DEFAULT_STORAGE_BUCKET: &str = "gallery";
const DEFAULT_SESSION_CACHE: &str = ".cicentre-session.json";
const DEFAULT_CHAT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Base URL of the hosted backend (auth, content store, object storage).
    pub backend_url: String,
    /// Service key sent as both `apikey` and bearer token on backend calls.
    pub backend_key: String,
    /// Object storage bucket holding gallery media.
    pub storage_bucket: String,
    /// Local file holding the persisted auth session between restarts.
    pub session_cache: PathBuf,
    /// Generative-language API keys, tried in order until one answers.
    pub chat_api_keys: Vec<String>,
    pub chat_model: String,
    /// Base URL of the generative-language API, overridable for tests.
    pub chat_endpoint: String,
}

impl Config {
    pub fn from_env() -> Self {
        let http_port = std::env::var("CICENTRE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        let backend_url = trim_trailing_slash(
            &std::env::var("CICENTRE_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
        );
        let backend_key = std::env::var("CICENTRE_BACKEND_KEY").unwrap_or_default();
        let storage_bucket =
            std::env::var("CICENTRE_STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_STORAGE_BUCKET.to_string());
        let session_cache = PathBuf::from(
            std::env::var("CICENTRE_SESSION_CACHE").unwrap_or_else(|_| DEFAULT_SESSION_CACHE.to_string()),
        );
        let chat_api_keys = parse_key_list(&std::env::var("CICENTRE_CHAT_KEYS").unwrap_or_default());
        let chat_model =
            std::env::var("CICENTRE_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let chat_endpoint = trim_trailing_slash(
            &std::env::var("CICENTRE_CHAT_ENDPOINT").unwrap_or_else(|_| DEFAULT_CHAT_ENDPOINT.to_string()),
        );
        Self {
            http_port,
            backend_url,
            backend_key,
            storage_bucket,
            session_cache,
            chat_api_keys,
            chat_model,
            chat_endpoint,
        }
    }
}

/// Split a comma-separated key list, dropping empty entries and whitespace.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
        .collect()
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
