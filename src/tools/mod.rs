//! 工具端口与同意门
//!
//! 三个副作用端口（SessionStore / ObjectStore / SheetRenderer）均为 trait + 工厂：
//! 工厂按配置返回 Live 或 Disabled 实现，并通过 availability() 显式上报可用性，
//! 流水线据此推断降级而不是翻全局状态。所有端口调用只在同意门放行后发生。

pub mod pdf;
pub mod storage;
pub mod store;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{Answer, PrepSession};

pub use pdf::{renderer_from_config, DisabledRenderer};
pub use storage::{object_store_from_config, DisabledObjectStore, GcsStore};
pub use store::{session_store_from_config, DisabledStore, FirestoreStore, InMemoryStore};

/// 端口可用性：工厂在构造时确定，之后不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAvailability {
    Available,
    Disabled { reason: String },
}

impl ToolAvailability {
    pub fn disabled(reason: impl Into<String>) -> Self {
        ToolAvailability::Disabled {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ToolAvailability::Available)
    }
}

/// 工具层错误：只记日志、降级响应，从不上抛为主操作的失败
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// 同意门：纯谓词，紧贴每次端口调用前求值，只看当前请求携带的 consent
/// （不跨请求缓存，阶段之间撤回同意即不再有任何写入）
pub struct ConsentGate;

impl ConsentGate {
    pub fn allows(consent: bool) -> bool {
        consent
    }
}

/// 会话存储更新字段（generate 迁移后的部分更新）
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub answers: Vec<Answer>,
    pub final_output_html: String,
    pub final_output_text: String,
    pub pdf_url: Option<String>,
    pub updated_at: String,
}

/// 会话存储端口：按 id 幂等 upsert
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn availability(&self) -> ToolAvailability;

    async fn create(&self, session: &PrepSession) -> Result<(), ToolError>;

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<(), ToolError>;
}

/// 对象存储端口：上传字节并返回可访问 URL
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn availability(&self) -> ToolAvailability;

    async fn upload(&self, data: &[u8], name: &str) -> Result<String, ToolError>;
}

/// 渲染端口：HTML → PDF 字节，纯转换、无其他副作用
#[async_trait]
pub trait SheetRenderer: Send + Sync {
    fn availability(&self) -> ToolAvailability;

    async fn to_pdf(&self, html: &str) -> Result<Vec<u8>, ToolError>;
}
