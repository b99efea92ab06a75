//! 渲染端口实现：Headless Chrome / Disabled
//!
//! 需启用 feature "pdf" 且系统已安装 Chrome/Chromium。渲染是纯转换
//! （HTML 字符串 → PDF 字节）；任何失败都按「PDF 不可用」处理，不影响主产物。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::tools::{SheetRenderer, ToolAvailability, ToolError};

/// 按配置构造渲染器：feature 编译且配置开启才返回 Chrome 渲染器
pub fn renderer_from_config(cfg: &AppConfig) -> Arc<dyn SheetRenderer> {
    if !cfg.tools.pdf.enabled {
        tracing::warn!("PDF rendering disabled in config");
        return Arc::new(DisabledRenderer::new("disabled in config"));
    }
    live_renderer()
}

#[cfg(feature = "pdf")]
fn live_renderer() -> Arc<dyn SheetRenderer> {
    Arc::new(ChromeRenderer)
}

#[cfg(not(feature = "pdf"))]
fn live_renderer() -> Arc<dyn SheetRenderer> {
    tracing::warn!("PDF feature not compiled, renderer disabled");
    Arc::new(DisabledRenderer::new("pdf feature not compiled"))
}

/// Headless Chrome 渲染器：data: URL 加载 HTML 后 print_to_pdf
#[cfg(feature = "pdf")]
pub struct ChromeRenderer;

#[cfg(feature = "pdf")]
#[async_trait]
impl SheetRenderer for ChromeRenderer {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn to_pdf(&self, html: &str) -> Result<Vec<u8>, ToolError> {
        use base64::{engine::general_purpose, Engine as _};

        let html = html.to_string();
        // headless_chrome 是同步 API，放到阻塞线程池里跑
        tokio::task::spawn_blocking(move || {
            let browser = headless_chrome::Browser::default()
                .map_err(|e| ToolError::Failed(format!("chrome launch failed: {e}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| ToolError::Failed(format!("chrome tab failed: {e}")))?;
            let url = format!(
                "data:text/html;base64,{}",
                general_purpose::STANDARD.encode(html.as_bytes())
            );
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| ToolError::Failed(format!("chrome navigation failed: {e}")))?;
            tab.print_to_pdf(None)
                .map_err(|e| ToolError::Failed(format!("print to pdf failed: {e}")))
        })
        .await
        .map_err(|e| ToolError::Failed(format!("render task panicked: {e}")))?
    }
}

/// 降级渲染器：记告警后返回 Unavailable（响应中省略 PDF 相关字段）
pub struct DisabledRenderer {
    reason: String,
}

impl DisabledRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SheetRenderer for DisabledRenderer {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::disabled(self.reason.clone())
    }

    async fn to_pdf(&self, _html: &str) -> Result<Vec<u8>, ToolError> {
        tracing::warn!("Sheet renderer disabled ({}), pdf skipped", self.reason);
        Err(ToolError::Unavailable(self.reason.clone()))
    }
}
