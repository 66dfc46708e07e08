//! Object storage collaborator client: upload bytes to a bucket path and
//! hand back the stable public URL.

use std::time::Duration;

use crate::error::{AppError, AppResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct StorageClient {
    base: String,
    api_key: String,
    bucket: String,
    http: reqwest::Client,
}

impl StorageClient {
    pub fn new(base: &str, api_key: &str, bucket: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AppError::from)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
            http,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base, self.bucket, path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base, self.bucket, path)
    }

    /// Upload and return the public URL of the stored object.
    pub async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        let resp = self
            .http
            .post(self.object_url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::from_status(status, &format!("upload {path}")));
        }
        Ok(self.public_url(path))
    }
}
