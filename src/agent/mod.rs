//! Agent Port：两阶段共用的统一能力
//!
//! invoke(stage, vars) -> JSON，由 RealAgent（模板渲染 + LLM + schema 解析）或
//! MockAgent（确定性、无网络）实现。Real / Mock 的选择在进程启动时按凭据做一次，
//! 不逐请求分支；进程内所有会话同一模式。

pub mod mock;
pub mod prompts;
pub mod real;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;
use crate::llm::{LlmError, OpenAiClient, RetryConfig, RetryingLlmClient};
use crate::stage::{StageSpec, StageVars};

pub use mock::MockAgent;
pub use real::RealAgent;

/// Agent 层错误：LLM 调用失败（重试耗尽后）或输出不符合阶段 schema
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 输出无法按阶段 schema 解析；不做静默纠偏，也不重试
    #[error("Schema mismatch in stage '{stage}': {detail}")]
    SchemaMismatch { stage: String, detail: String },
}

/// Agent Port trait：按阶段规格与变量表产出结构化 JSON
#[async_trait]
pub trait AgentPort: Send + Sync {
    async fn invoke(
        &self,
        stage: &StageSpec,
        vars: &StageVars,
    ) -> Result<serde_json::Value, AgentError>;
}

/// 根据配置与环境变量选择 Agent 实现（GEMINI / GOOGLE / OPENAI Key 任一存在则走真实后端）
pub fn create_agent_from_config(cfg: &AppConfig) -> Arc<dyn AgentPort> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();

    match api_key {
        Some(key) => {
            tracing::info!("Using real agent ({})", cfg.llm.model);
            let llm = Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(key.as_str()),
                cfg.llm.timeouts.request,
            ));
            let retrying = Arc::new(RetryingLlmClient::new(
                llm,
                RetryConfig {
                    max_attempts: cfg.llm.retry.max_attempts,
                    base_delay_ms: cfg.llm.retry.base_delay_ms,
                },
            ));
            Arc::new(RealAgent::new(retrying))
        }
        None => {
            tracing::warn!("No API key set, using deterministic mock agent");
            Arc::new(MockAgent)
        }
    }
}
