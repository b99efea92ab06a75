//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PREPMATE__*` 覆盖（双下划线表示嵌套，
//! 如 `PREPMATE__LLM__MODEL=gemini-2.5-flash`）。API Key 始终走环境变量，不进配置文件。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：应用名与默认语言
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// IETF 语言标签，请求未携带 language_code 时使用
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// [llm] 段：模型、端点与超时/重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点（Gemini 的 openai/ 兼容层、自建代理等）；缺省走官方端点
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次 LLM 请求超时（秒），超时按可重试错误处理
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [llm.retry] 段：瞬时错误（超时 / 限流）的有界重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

/// [tools] 段：Firestore / GCS / PDF 渲染
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    #[serde(default)]
    pub firestore: FirestoreSection,
    #[serde(default)]
    pub gcs: GcsSection,
    #[serde(default)]
    pub pdf: PdfSection,
}

/// [tools.firestore] 段：project 未配置时会话存储降级为 no-op
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreSection {
    pub project_id: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for FirestoreSection {
    fn default() -> Self {
        Self {
            project_id: None,
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "prep_sessions".to_string()
}

/// [tools.gcs] 段：bucket 未配置时 PDF 上传降级为 no-op
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GcsSection {
    pub bucket: Option<String>,
}

/// [tools.pdf] 段：渲染开关（还需编译 feature "pdf" 并安装 Chrome）
#[derive(Debug, Clone, Deserialize)]
pub struct PdfSection {
    #[serde(default = "default_pdf_enabled")]
    pub enabled: bool,
}

impl Default for PdfSection {
    fn default() -> Self {
        Self {
            enabled: default_pdf_enabled(),
        }
    }
}

fn default_pdf_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 PREPMATE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PREPMATE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PREPMATE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.default_language, "en");
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert_eq!(cfg.llm.retry.base_delay_ms, 500);
        assert_eq!(cfg.tools.firestore.collection, "prep_sessions");
        assert!(cfg.tools.firestore.project_id.is_none());
        assert!(cfg.tools.gcs.bucket.is_none());
        assert!(cfg.tools.pdf.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[app]
default_language = "hi"

[llm]
model = "gemini-2.5-pro"

[llm.retry]
max_attempts = 5

[tools.firestore]
project_id = "demo-project"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.default_language, "hi");
        assert_eq!(cfg.llm.model, "gemini-2.5-pro");
        assert_eq!(cfg.llm.retry.max_attempts, 5);
        // 未覆盖的键保持默认
        assert_eq!(cfg.llm.retry.base_delay_ms, 500);
        assert_eq!(
            cfg.tools.firestore.project_id.as_deref(),
            Some("demo-project")
        );
    }
}
