//! 流水线错误分类
//!
//! Validation：输入不合法，在任何阶段调用之前检出，不重试、无部分状态；
//! Agent：阶段调用在重试耗尽后失败或 schema 不符，当前迁移原子中止，会话入 Failed。
//! 工具降级（store / upload / render 不可用或失败）不在此枚举：只记日志并在响应中
//! 省略对应可选字段，从不作为主操作的失败上抛。

use thiserror::Error;

use crate::agent::AgentError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}
