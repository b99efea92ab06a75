//! LLM 客户端抽象
//!
//! 后端实现 LlmClient::complete；RetryingLlmClient 对瞬时错误（超时 / 限流）做
//! 有界指数退避重试，其余错误直接上抛。每个进程只在启动时选定一个后端。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致；本系统只用 System / User）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// LLM 层错误；只有 Timeout / RateLimited 可重试
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Empty completion")]
    EmptyCompletion,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Timeout | LlmError::RateLimited { .. })
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

/// 重试参数：最多 max_attempts 次，第 n 次重试前等待 base_delay_ms * 2^(n-1)
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// 重试包装：可重试错误退避后再试，限流时取 retry_after 与退避的较大者
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn backoff_ms(&self, attempt: u32, err: &LlmError) -> u64 {
        // 指数因子封顶，避免配置超大 max_attempts 时移位溢出
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let backoff = self.config.base_delay_ms.saturating_mul(factor);
        match err {
            LlmError::RateLimited { retry_after_ms } => backoff.max(*retry_after_ms),
            _ => backoff,
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.backoff_ms(attempt, &e);
                    tracing::warn!(
                        "LLM call failed (attempt {attempt}/{}): {e}; retrying in {delay}ms",
                        self.config.max_attempts
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 fail_times 次返回指定错误，之后成功
    struct FlakyClient {
        fail_times: u32,
        error: LlmError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let inner = Arc::new(FlakyClient {
            fail_times: 2,
            error: LlmError::Timeout,
            calls: AtomicU32::new(0),
        });
        let client = RetryingLlmClient::new(inner.clone(), fast_retry(3));
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_error() {
        let inner = Arc::new(FlakyClient {
            fail_times: 10,
            error: LlmError::RateLimited { retry_after_ms: 1 },
            calls: AtomicU32::new(0),
        });
        let client = RetryingLlmClient::new(inner.clone(), fast_retry(3));
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let inner = Arc::new(FlakyClient {
            fail_times: 10,
            error: LlmError::ApiError("bad request".into()),
            calls: AtomicU32::new(0),
        });
        let client = RetryingLlmClient::new(inner.clone(), fast_retry(3));
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let client = RetryingLlmClient::new(
            Arc::new(FlakyClient {
                fail_times: 0,
                error: LlmError::Timeout,
                calls: AtomicU32::new(0),
            }),
            RetryConfig {
                max_attempts: 3,
                base_delay_ms: 100,
            },
        );
        assert_eq!(client.backoff_ms(1, &LlmError::Timeout), 100);
        assert_eq!(client.backoff_ms(2, &LlmError::Timeout), 200);
        assert_eq!(
            client.backoff_ms(1, &LlmError::RateLimited { retry_after_ms: 900 }),
            900
        );
    }

    #[test]
    fn test_backoff_saturates_on_large_attempt() {
        let client = RetryingLlmClient::new(
            Arc::new(FlakyClient {
                fail_times: 0,
                error: LlmError::Timeout,
                calls: AtomicU32::new(0),
            }),
            RetryConfig {
                max_attempts: 128,
                base_delay_ms: 100,
            },
        );
        assert_eq!(client.backoff_ms(70, &LlmError::Timeout), u64::MAX);
        assert_eq!(client.backoff_ms(128, &LlmError::Timeout), u64::MAX);
    }
}
