//! Typed rows for the content-store tables, parsed at the boundary.
//!
//! The hosted backend hands back loosely-shaped JSON; every table gets an
//! explicit row struct here plus insert/patch payloads, so nothing downstream
//! ever touches an untyped blob. Field validation lives next to the payloads
//! and runs before any network call.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const TABLE_ADMIN_USERS: &str = "admin_users";
pub const TABLE_CLIMATE_CONTENT: &str = "climate_content";
pub const TABLE_BLOG_POSTS: &str = "blog_posts";
pub const TABLE_GALLERY: &str = "gallery";
pub const TABLE_DATA_SOURCES: &str = "data_sources";

/// Minimal address shape check, applied before credentials leave the process.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("{field}_required"),
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

/// Marker row for a privileged user. Created out-of-band; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Informational article shown on the public climate pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl NewArticle {
    pub fn validate(&self) -> AppResult<()> {
        require_non_empty("title", &self.title)?;
        require_non_empty("content", &self.content)?;
        require_non_empty("category", &self.category)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticlePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ArticlePatch {
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [
            ("title", &self.title),
            ("content", &self.content),
            ("category", &self.category),
        ] {
            if let Some(v) = value {
                require_non_empty(field, v)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlogPost {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewBlogPost {
    pub fn validate(&self) -> AppResult<()> {
        require_non_empty("title", &self.title)?;
        require_non_empty("content", &self.content)?;
        require_non_empty("author", &self.author)?;
        require_non_empty("category", &self.category)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogPostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl BlogPostPatch {
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [
            ("title", &self.title),
            ("content", &self.content),
            ("author", &self.author),
            ("category", &self.category),
        ] {
            if let Some(v) = value {
                require_non_empty(field, v)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GalleryItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGalleryItem {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_url: String,
}

impl NewGalleryItem {
    pub fn validate(&self) -> AppResult<()> {
        require_non_empty("title", &self.title)?;
        require_non_empty("image_url", &self.image_url)
    }
}

/// Descriptor for an external data feed the chatbot may reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDataSource {
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
}

impl NewDataSource {
    pub fn validate(&self) -> AppResult<()> {
        require_non_empty("name", &self.name)?;
        require_non_empty("url", &self.url)?;
        require_non_empty("category", &self.category)?;
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(AppError::validation("url_invalid", "url must be an http(s) address"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<DateTime<Utc>>,
}

impl DataSourcePatch {
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [("name", &self.name), ("url", &self.url), ("category", &self.category)] {
            if let Some(v) = value {
                require_non_empty(field, v)?;
            }
        }
        Ok(())
    }
}
