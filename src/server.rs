//!
//! Climate Information Centre HTTP server
//! --------------------------------------
//! This module defines the Axum-based HTTP surface: the public content pages,
//! the sign-in endpoints, the guarded admin area, and the chat widget relay.
//!
//! Responsibilities:
//! - Session bootstrap: build the collaborator clients, then initialize the
//!   session manager before accepting traffic.
//! - Public read endpoints delegating to the content store.
//! - Admin CRUD endpoints wrapped by the route guard middleware.
//! - Gallery upload via the object storage collaborator.
//! - Chat relay with content-store augmentation and a fixed fallback reply.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{ContentClient, HttpAuthClient, ListQuery, StorageClient};
use crate::chat::{
    build_prompt, ChatClient, ChatSettings, ContextSnippet, SharedChatSettings, FALLBACK_MESSAGE,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::records::{
    is_valid_email, is_valid_password, AdminUser, Article, ArticlePatch, BlogPost, BlogPostPatch,
    DataSource, DataSourcePatch, GalleryItem, NewArticle, NewBlogPost, NewDataSource,
    NewGalleryItem, TABLE_ADMIN_USERS, TABLE_BLOG_POSTS, TABLE_CLIMATE_CONTENT, TABLE_DATA_SOURCES,
    TABLE_GALLERY,
};
use crate::session::{require_admin, SessionManager};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub content: Arc<ContentClient>,
    pub storage: Arc<StorageClient>,
    pub chat: Arc<ChatClient>,
    pub chat_settings: Arc<SharedChatSettings>,
    /// Short-timeout client used only to probe external data-source URLs.
    pub probe: reqwest::Client,
}

/// Convenience entry point using configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(Config::from_env()).await
}

pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    if config.backend_key.is_empty() {
        warn!("CICENTRE_BACKEND_KEY is empty; backend calls will be rejected");
    }
    if config.chat_api_keys.is_empty() {
        warn!("no chat API keys configured; the chat widget will answer with its fallback message");
    }

    let auth = Arc::new(HttpAuthClient::new(
        &config.backend_url,
        &config.backend_key,
        &config.session_cache,
    )?);
    let content = Arc::new(ContentClient::new(&config.backend_url, &config.backend_key)?);
    let storage = Arc::new(StorageClient::new(
        &config.backend_url,
        &config.backend_key,
        &config.storage_bucket,
    )?);
    let chat = Arc::new(ChatClient::new(
        &config.chat_endpoint,
        &config.chat_model,
        config.chat_api_keys.clone(),
    )?);

    let sessions = SessionManager::new(auth, content.clone());
    // Resolve the restored session (and its privilege check) before serving
    sessions.initialize().await;

    let state = AppState {
        config: Arc::new(config),
        sessions,
        content,
        storage,
        chat,
        chat_settings: Arc::new(SharedChatSettings::new(ChatSettings::default())),
        probe: reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?,
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", state.config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Mount all routes. The admin sub-router is wrapped by the route guard, so
/// every admin handler can assume an authenticated administrator.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/", get(admin_dashboard))
        .route("/content", get(admin_list_content).post(admin_create_content))
        .route("/content/{id}", put(admin_update_content).delete(admin_delete_content))
        .route("/blog", get(admin_list_blog).post(admin_create_blog))
        .route("/blog/{id}", put(admin_update_blog).delete(admin_delete_blog))
        .route("/gallery", get(admin_list_gallery).post(admin_create_gallery))
        .route("/gallery/{id}", delete(admin_delete_gallery))
        .route("/gallery/upload", post(admin_upload_image))
        .route("/data-sources", get(admin_list_sources).post(admin_create_source))
        .route("/data-sources/{id}", put(admin_update_source).delete(admin_delete_source))
        .route("/data-sources/{id}/check", post(admin_check_source))
        .route("/chatbot", get(admin_get_chat_settings).put(admin_put_chat_settings))
        .route("/users", get(admin_list_users))
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            require_admin,
        ));

    Router::new()
        .route("/", get(site_index))
        .route("/content/{category}", get(content_by_category))
        .route("/blog", get(blog_index))
        .route("/blog/{id}", get(blog_post))
        .route("/gallery", get(gallery_index))
        .route("/chat", post(chat_message))
        .route("/auth", get(auth_page))
        .route("/auth/login", post(auth_login))
        .route("/auth/logout", post(auth_logout))
        .nest("/admin", admin)
        .fallback(not_found)
        .with_state(state)
}

// ---- public pages ----------------------------------------------------------

async fn site_index() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "title": "Climate Information Centre",
        "sections": [
            { "title": "Climate Information", "path": "/content/climate-information" },
            { "title": "Adaptation Campaigns", "path": "/content/adaptation-campaigns" },
            { "title": "Resilient Leadership", "path": "/content/resilient-leadership" },
            { "title": "Call To Action", "path": "/content/call-to-action" },
            { "title": "Blog", "path": "/blog" },
            { "title": "Gallery", "path": "/gallery" },
        ],
    }))
}

async fn content_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let items: Vec<Article> = state
        .content
        .list(
            TABLE_CLIMATE_CONTENT,
            &ListQuery::default().filter_eq("category", &category).order_desc("last_updated"),
        )
        .await?;
    Ok(Json(json!({ "status": "ok", "category": category, "items": items })))
}

async fn blog_index(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let posts: Vec<BlogPost> = state
        .content
        .list(TABLE_BLOG_POSTS, &ListQuery::default().order_desc("created_at"))
        .await?;
    Ok(Json(json!({ "status": "ok", "posts": posts })))
}

async fn blog_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let post: BlogPost = state.content.get_by_id(TABLE_BLOG_POSTS, &id).await?;
    Ok(Json(json!({ "status": "ok", "post": post })))
}

async fn gallery_index(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let items: Vec<GalleryItem> = state
        .content
        .list(TABLE_GALLERY, &ListQuery::default().order_desc("created_at"))
        .await?;
    Ok(Json(json!({ "status": "ok", "items": items })))
}

// ---- chat widget -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatPayload {
    message: String,
}

async fn chat_message(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let question = payload.message.trim();
    if question.is_empty() {
        return Err(AppError::validation("message_required", "message must not be empty"));
    }
    let settings = state.chat_settings.read().clone();

    // Augmentation is best-effort: a content-store failure degrades to the
    // bare prompt rather than failing the widget
    let mut context: Vec<ContextSnippet> = Vec::new();
    if settings.use_climate_content {
        let recent: AppResult<Vec<Article>> = state
            .content
            .list(
                TABLE_CLIMATE_CONTENT,
                &ListQuery::default().order_desc("last_updated").limit(5),
            )
            .await;
        match recent {
            Ok(rows) => {
                context.extend(
                    rows.into_iter()
                        .map(|a| ContextSnippet { title: a.title, body: a.content }),
                );
            }
            Err(e) => warn!("chat augmentation skipped, content store failed: {e}"),
        }
    }

    let prompt = build_prompt(&settings, question, &context);
    match state.chat.generate(&prompt, &settings).await {
        Ok(reply) => Ok(Json(json!({ "status": "ok", "reply": reply, "source": "model" }))),
        Err(e) => {
            warn!("chat relay failed, answering with fallback: {e}");
            Ok(Json(json!({ "status": "ok", "reply": FALLBACK_MESSAGE, "source": "fallback" })))
        }
    }
}

// ---- sign-in screen --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AuthPageQuery {
    notice: Option<String>,
}

async fn auth_page(Query(query): Query<AuthPageQuery>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "page": "sign-in",
        "notice": query.notice,
    }))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn auth_login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Response {
    // Local validation happens before any collaborator call
    let mut errors = serde_json::Map::new();
    if !is_valid_email(payload.email.trim()) {
        errors.insert("email".into(), json!("Please enter a valid email address"));
    }
    if !is_valid_password(&payload.password) {
        errors.insert("password".into(), json!("Password must be at least 6 characters"));
    }
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "code": "validation", "errors": errors })),
        )
            .into_response();
    }

    match state.sessions.sign_in(payload.email.trim(), &payload.password).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "message": "Signed in." })),
        )
            .into_response(),
        Err(AppError::Unauthorized { .. }) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "error",
                "code": "invalid_credentials",
                // Collaborator error detail stays out of the user-facing text
                "message": "Invalid admin credentials. Please try again.",
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn auth_logout(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.sessions.sign_out().await {
        Ok(()) => Json(json!({ "status": "ok", "message": "You have been signed out." })),
        Err(e) => {
            // Local state is already reset; report completion with a warning
            warn!("sign-out completed locally, remote revocation failed: {e}");
            Json(json!({
                "status": "ok",
                "message": "You have been signed out.",
                "warning": "remote sign-out failed",
            }))
        }
    }
}

// ---- admin area (behind the route guard) -----------------------------------

async fn admin_dashboard(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let content = state.content.count(TABLE_CLIMATE_CONTENT).await?;
    let blog = state.content.count(TABLE_BLOG_POSTS).await?;
    let gallery = state.content.count(TABLE_GALLERY).await?;
    let sources = state.content.count(TABLE_DATA_SOURCES).await?;
    Ok(Json(json!({
        "status": "ok",
        "counts": {
            "climate_content": content,
            "blog_posts": blog,
            "gallery": gallery,
            "data_sources": sources,
        },
    })))
}

async fn admin_list_content(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let items: Vec<Article> = state
        .content
        .list(TABLE_CLIMATE_CONTENT, &ListQuery::default().order_desc("last_updated"))
        .await?;
    Ok(Json(json!({ "status": "ok", "items": items })))
}

async fn admin_create_content(
    State(state): State<AppState>,
    Json(payload): Json<NewArticle>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let created: Article = state.content.insert(TABLE_CLIMATE_CONTENT, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok", "item": created }))))
}

async fn admin_update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ArticlePatch>,
) -> AppResult<Json<serde_json::Value>> {
    patch.validate()?;
    let updated: Article = state.content.update(TABLE_CLIMATE_CONTENT, &id, &patch).await?;
    Ok(Json(json!({ "status": "ok", "item": updated })))
}

async fn admin_delete_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.content.delete(TABLE_CLIMATE_CONTENT, &id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn admin_list_blog(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let posts: Vec<BlogPost> = state
        .content
        .list(TABLE_BLOG_POSTS, &ListQuery::default().order_desc("created_at"))
        .await?;
    Ok(Json(json!({ "status": "ok", "posts": posts })))
}

async fn admin_create_blog(
    State(state): State<AppState>,
    Json(payload): Json<NewBlogPost>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let created: BlogPost = state.content.insert(TABLE_BLOG_POSTS, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok", "post": created }))))
}

async fn admin_update_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<BlogPostPatch>,
) -> AppResult<Json<serde_json::Value>> {
    patch.validate()?;
    let updated: BlogPost = state.content.update(TABLE_BLOG_POSTS, &id, &patch).await?;
    Ok(Json(json!({ "status": "ok", "post": updated })))
}

async fn admin_delete_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.content.delete(TABLE_BLOG_POSTS, &id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn admin_list_gallery(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let items: Vec<GalleryItem> = state
        .content
        .list(TABLE_GALLERY, &ListQuery::default().order_desc("created_at"))
        .await?;
    Ok(Json(json!({ "status": "ok", "items": items })))
}

async fn admin_create_gallery(
    State(state): State<AppState>,
    Json(payload): Json<NewGalleryItem>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let created: GalleryItem = state.content.insert(TABLE_GALLERY, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok", "item": created }))))
}

async fn admin_delete_gallery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.content.delete(TABLE_GALLERY, &id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct UploadPayload {
    file_name: String,
    content_type: String,
    data_base64: String,
}

/// Keep only filesystem-safe characters from a client-supplied file name.
fn sanitize_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if safe.trim_matches('-').is_empty() { "upload".to_string() } else { safe }
}

async fn admin_upload_image(
    State(state): State<AppState>,
    Json(payload): Json<UploadPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.file_name.trim().is_empty() {
        return Err(AppError::validation("file_name_required", "file_name must not be empty"));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.data_base64.trim())
        .map_err(|_| AppError::validation("data_invalid", "data_base64 is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("data_required", "uploaded file is empty"));
    }
    let content_type = if payload.content_type.trim().is_empty() {
        "application/octet-stream"
    } else {
        payload.content_type.trim()
    };
    let path = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(payload.file_name.trim()));
    let url = state.storage.upload(&path, bytes, content_type).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok", "image_url": url }))))
}

async fn admin_list_sources(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let sources: Vec<DataSource> = state
        .content
        .list(TABLE_DATA_SOURCES, &ListQuery::default().order_asc("name"))
        .await?;
    Ok(Json(json!({ "status": "ok", "sources": sources })))
}

async fn admin_create_source(
    State(state): State<AppState>,
    Json(payload): Json<NewDataSource>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let created: DataSource = state.content.insert(TABLE_DATA_SOURCES, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok", "source": created }))))
}

async fn admin_update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<DataSourcePatch>,
) -> AppResult<Json<serde_json::Value>> {
    patch.validate()?;
    let updated: DataSource = state.content.update(TABLE_DATA_SOURCES, &id, &patch).await?;
    Ok(Json(json!({ "status": "ok", "source": updated })))
}

async fn admin_delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.content.delete(TABLE_DATA_SOURCES, &id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Probe the descriptor's URL; stamp `last_fetched` when it answers.
async fn admin_check_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let source: DataSource = state.content.get_by_id(TABLE_DATA_SOURCES, &id).await?;
    let reachable = match state.probe.get(&source.url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            warn!("data source {} unreachable: {e}", source.name);
            false
        }
    };
    if reachable {
        let patch = DataSourcePatch { last_fetched: Some(Utc::now()), ..Default::default() };
        let _: DataSource = state.content.update(TABLE_DATA_SOURCES, &id, &patch).await?;
    }
    Ok(Json(json!({ "status": "ok", "source": source.name, "reachable": reachable })))
}

/// The administrators set is managed out-of-band; this view is read-only.
async fn admin_list_users(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let users: Vec<AdminUser> = state
        .content
        .list(TABLE_ADMIN_USERS, &ListQuery::default().order_asc("created_at"))
        .await?;
    Ok(Json(json!({ "status": "ok", "users": users })))
}

async fn admin_get_chat_settings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = state.chat_settings.read().clone();
    Json(json!({ "status": "ok", "settings": settings }))
}

async fn admin_put_chat_settings(
    State(state): State<AppState>,
    Json(settings): Json<ChatSettings>,
) -> AppResult<Json<serde_json::Value>> {
    settings.validate()?;
    *state.chat_settings.write() = settings.clone();
    Ok(Json(json!({ "status": "ok", "settings": settings })))
}

// ---- fallback --------------------------------------------------------------

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "code": "not_found", "message": "No such page" })),
    )
}
