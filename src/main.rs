use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("CICENTRE_HTTP_PORT").unwrap_or_else(|_| "7878".to_string());
    let backend = std::env::var("CICENTRE_BACKEND_URL").unwrap_or_else(|_| "<unset>".to_string());
    let chat_model = std::env::var("CICENTRE_CHAT_MODEL").unwrap_or_else(|_| "<default>".to_string());
    info!(
        target: "cicentre",
        "Climate Information Centre starting: RUST_LOG='{}', http_port={}, backend='{}', chat_model='{}'",
        rust_log, http_port, backend, chat_model
    );

    cicentre::server::run().await
}
