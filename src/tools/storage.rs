//! 对象存储端口实现：GCS / Disabled
//!
//! GcsStore 走 JSON API 的 media 上传，返回对象的公开 URL；
//! 未配置 bucket 时工厂返回 DisabledObjectStore（告警 + no-op）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::tools::{ObjectStore, ToolAvailability, ToolError};

/// 按配置构造对象存储：有 bucket 用 GCS，否则降级
pub fn object_store_from_config(cfg: &AppConfig) -> Arc<dyn ObjectStore> {
    match cfg.tools.gcs.bucket.clone() {
        Some(bucket) => Arc::new(GcsStore::new(bucket)),
        None => {
            tracing::warn!("GCS bucket not configured, object store disabled");
            Arc::new(DisabledObjectStore::new("gcs bucket not configured"))
        }
    }
}

/// GCS 对象存储：media 上传 PDF，content-type 固定 application/pdf
pub struct GcsStore {
    http: reqwest::Client,
    bucket: String,
}

impl GcsStore {
    pub fn new(bucket: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn upload(&self, data: &[u8], name: &str) -> Result<String, ToolError> {
        let upload_url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket, name
        );

        let mut request = self
            .http
            .post(&upload_url)
            .header("content-type", "application/pdf")
            .body(data.to_vec());
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("gcs upload failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed(format!("gcs returned {status}: {text}")));
        }

        Ok(format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket, name
        ))
    }
}

/// 降级对象存储：记告警后返回 Unavailable（上游只据此省略 pdf_url）
pub struct DisabledObjectStore {
    reason: String,
}

impl DisabledObjectStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for DisabledObjectStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::disabled(self.reason.clone())
    }

    async fn upload(&self, _data: &[u8], name: &str) -> Result<String, ToolError> {
        tracing::warn!("Object store disabled ({}), upload skipped for {name}", self.reason);
        Err(ToolError::Unavailable(self.reason.clone()))
    }
}
