//! 会话存储端口实现：Firestore REST / Disabled / InMemory
//!
//! FirestoreStore 走 REST v1 文档接口，create/update 都是按 id 的幂等 upsert；
//! 未配置 project 时工厂返回 DisabledStore（告警 + no-op）。InMemoryStore 供
//! 测试与本地演示，同一 id 的并发写采用 last-writer-wins（显式策略）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::session::{PatientInfo, PrepSession};
use crate::tools::{SessionStore, SessionUpdate, ToolAvailability, ToolError};

/// 按配置构造会话存储：有 project_id 用 Firestore，否则降级
pub fn session_store_from_config(cfg: &AppConfig) -> Arc<dyn SessionStore> {
    match cfg.tools.firestore.project_id.clone() {
        Some(project_id) => Arc::new(FirestoreStore::new(
            project_id,
            cfg.tools.firestore.collection.clone(),
        )),
        None => {
            tracing::warn!("Firestore project not configured, session store disabled");
            Arc::new(DisabledStore::new("firestore project not configured"))
        }
    }
}

/// Firestore REST 存储：文档路径 projects/{p}/databases/(default)/documents/{collection}/{id}
pub struct FirestoreStore {
    http: reqwest::Client,
    project_id: String,
    collection: String,
}

impl FirestoreStore {
    pub fn new(project_id: String, collection: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id,
            collection,
        }
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents/{}/{}",
            self.project_id, self.collection, doc_id
        )
    }

    async fn patch(&self, url: String, body: Value) -> Result<(), ToolError> {
        let mut request = self.http.patch(&url).json(&body);
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("firestore request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed(format!(
                "firestore returned {status}: {text}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FirestoreStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn create(&self, session: &PrepSession) -> Result<(), ToolError> {
        let doc = serde_json::to_value(session)
            .map_err(|e| ToolError::Failed(format!("serialize session: {e}")))?;
        let body = json!({ "fields": to_firestore_fields(&doc) });
        self.patch(self.doc_url(&session.id), body).await
    }

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<(), ToolError> {
        let answers = serde_json::to_value(&update.answers)
            .map_err(|e| ToolError::Failed(format!("serialize answers: {e}")))?;
        let fields = json!({
            "followup_data": firestore_value(&json!({ "answers": answers })),
            "final_output_html": firestore_value(&Value::String(update.final_output_html)),
            "final_output_text": firestore_value(&Value::String(update.final_output_text)),
            "pdf_url": firestore_value(&update.pdf_url.map(Value::String).unwrap_or(Value::Null)),
            "updated_at": firestore_value(&Value::String(update.updated_at)),
        });
        let mask = [
            "followup_data.answers",
            "final_output_html",
            "final_output_text",
            "pdf_url",
            "updated_at",
        ]
        .iter()
        .map(|f| format!("updateMask.fieldPaths={f}"))
        .collect::<Vec<_>>()
        .join("&");
        let url = format!("{}?{}", self.doc_url(session_id), mask);
        self.patch(url, json!({ "fields": fields })).await
    }
}

/// JSON 对象 → Firestore fields map（mapValue 的 fields 部分）
fn to_firestore_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let fields: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), firestore_value(v)))
                .collect();
            Value::Object(fields)
        }
        other => json!({ "value": firestore_value(other) }),
    }
}

/// JSON 值 → Firestore 类型化 Value（integerValue 按协议要求传字符串）
fn firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            json!({ "integerValue": n.to_string() })
        }
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(firestore_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": to_firestore_fields(value) } }),
    }
}

/// 降级存储：记告警后 no-op，从不失败（存储不可用不阻塞主响应）
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SessionStore for DisabledStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::disabled(self.reason.clone())
    }

    async fn create(&self, session: &PrepSession) -> Result<(), ToolError> {
        tracing::warn!("Session store disabled ({}), create skipped for {}", self.reason, session.id);
        Ok(())
    }

    async fn update(&self, session_id: &str, _update: SessionUpdate) -> Result<(), ToolError> {
        tracing::warn!("Session store disabled ({}), update skipped for {session_id}", self.reason);
        Ok(())
    }
}

/// 内存存储：测试与本地演示用；create/update 计数用于契约测试
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, PrepSession>>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<PrepSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn create(&self, session: &PrepSession) -> Result<(), ToolError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    // 同一 id 的后写覆盖先写（last-writer-wins）；未知 id 按 PATCH 语义
    // 先建骨架文档再写入（与 FirestoreStore 保持一致的 upsert 契约）
    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<(), ToolError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            PrepSession::new(
                Some(session_id.to_string()),
                PatientInfo::default(),
                String::new(),
                "en".into(),
            )
        });
        session.followup_data.answers = update.answers;
        session.final_output_html = Some(update.final_output_html);
        session.final_output_text = Some(update.final_output_text);
        session.pdf_url = update.pdf_url;
        session.updated_at = update.updated_at;
        Ok(())
    }
}
