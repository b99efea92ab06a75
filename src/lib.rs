//! PrepMate - 就诊准备助手（两阶段 LLM 流水线）
//!
//! 模块划分：
//! - **agent**: Agent Port 抽象与实现（Real / Mock，进程启动时按配置二选一）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容端点 / 重试包装）
//! - **observability**: tracing 日志初始化
//! - **pipeline**: 会话流水线（suggest / generate 两次状态迁移与同意门控副作用）
//! - **session**: PrepSession 聚合与状态机
//! - **stage**: 两个阶段的 Prompt 模板与输出 schema
//! - **tools**: 工具端口（SessionStore / ObjectStore / SheetRenderer）与同意门

pub mod agent;
pub mod config;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod session;
pub mod stage;
pub mod tools;
