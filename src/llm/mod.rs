//! LLM 层：客户端抽象与实现（OpenAI 兼容端点 / 有界重试包装）

pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, Message, RetryConfig, RetryingLlmClient, Role};
