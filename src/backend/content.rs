//! Content store collaborator client.
//!
//! Generic CRUD against the hosted backend's REST data surface plus the one
//! privileged RPC this system relies on: `is_admin_user`. Rows are
//! deserialized straight into the typed records from `crate::records`; the
//! raw JSON never crosses this boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AppResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Listing options: a single equality filter, ordering, and a row cap.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: Option<(String, String)>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn filter_eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some((column.to_string(), value.to_string()));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), true));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), false));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some((col, val)) = &self.filter {
            parts.push(format!("{}=eq.{}", col, urlencoding::encode(val)));
        }
        if let Some((col, desc)) = &self.order {
            parts.push(format!("order={}.{}", col, if *desc { "desc" } else { "asc" }));
        }
        if let Some(n) = self.limit {
            parts.push(format!("limit={n}"));
        }
        parts.join("&")
    }
}

/// The one privileged check the session core needs. Narrow on purpose so the
/// session manager can be exercised against a double.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn is_admin_user(&self, user_id: &str) -> AppResult<bool>;
}

pub struct ContentClient {
    base: String,
    api_key: String,
    http: reqwest::Client,
}

impl ContentClient {
    pub fn new(base: &str, api_key: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AppError::from)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base, function)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    pub async fn list<T: DeserializeOwned>(&self, table: &str, query: &ListQuery) -> AppResult<Vec<T>> {
        let qs = query.query_string();
        let url = if qs.is_empty() {
            self.table_url(table)
        } else {
            format!("{}?{}", self.table_url(table), qs)
        };
        let resp = self.authed(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("list {table}")));
        }
        Ok(resp.json().await?)
    }

    pub async fn get_by_id<T: DeserializeOwned>(&self, table: &str, id: &str) -> AppResult<T> {
        let url = format!("{}?id=eq.{}", self.table_url(table), urlencoding::encode(id));
        let resp = self.authed(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("get {table}")));
        }
        let mut rows: Vec<T> = resp.json().await?;
        match rows.pop() {
            Some(row) => Ok(row),
            None => Err(AppError::not_found("record_missing", format!("no {table} row with id {id}"))),
        }
    }

    pub async fn insert<T: DeserializeOwned, B: Serialize>(&self, table: &str, row: &B) -> AppResult<T> {
        let resp = self
            .authed(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("insert {table}")));
        }
        let mut rows: Vec<T> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| AppError::unknown("empty_insert", format!("insert into {table} returned no row")))
    }

    pub async fn update<T: DeserializeOwned, B: Serialize>(
        &self,
        table: &str,
        id: &str,
        patch: &B,
    ) -> AppResult<T> {
        let url = format!("{}?id=eq.{}", self.table_url(table), urlencoding::encode(id));
        let resp = self
            .authed(self.http.patch(&url))
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("update {table}")));
        }
        let mut rows: Vec<T> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| AppError::not_found("record_missing", format!("no {table} row with id {id}")))
    }

    pub async fn delete(&self, table: &str, id: &str) -> AppResult<()> {
        let url = format!("{}?id=eq.{}", self.table_url(table), urlencoding::encode(id));
        let resp = self.authed(self.http.delete(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("delete {table}")));
        }
        Ok(())
    }

    /// Row count for the dashboard. Asks for an exact count header and falls
    /// back to the body length when the backend omits it.
    pub async fn count(&self, table: &str) -> AppResult<usize> {
        let url = format!("{}?select=id", self.table_url(table));
        let resp = self
            .authed(self.http.get(&url))
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("count {table}")));
        }
        if let Some(total) = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
        {
            return Ok(total);
        }
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(rows.len())
    }
}

fn parse_content_range_total(header: &str) -> Option<usize> {
    header.rsplit('/').next()?.parse().ok()
}

#[async_trait]
impl AdminDirectory for ContentClient {
    async fn is_admin_user(&self, user_id: &str) -> AppResult<bool> {
        let resp = self
            .authed(self.http.post(self.rpc_url("is_admin_user")))
            .json(&serde_json::json!({ "user_id": user_id }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            warn!("is_admin_user rpc failed with HTTP {status}");
            return Err(AppError::from_status(status, "is_admin_user"));
        }
        let verdict: serde_json::Value = resp.json().await?;
        Ok(verdict.as_bool().unwrap_or(false))
    }
}
