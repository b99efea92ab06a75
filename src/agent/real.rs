//! RealAgent：渲染模板 → 调 LLM → 提取并解析 JSON
//!
//! LLM 偶尔会把 JSON 包在 ```json 围栏或解释文字里，extract_json 先取出 JSON 块
//! 再解析；解析失败即 SchemaMismatch（阶段的类型化校验在 stage::parse 再做一层）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{prompts, AgentError, AgentPort};
use crate::llm::{LlmClient, Message};
use crate::stage::{StageSpec, StageVars};

/// 真实 Agent：持有（已包重试的）LLM 客户端
pub struct RealAgent {
    llm: Arc<dyn LlmClient>,
}

impl RealAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// 从 LLM 输出中取出 JSON 块（```json ... ``` 围栏或首个 { 到末个 }）
fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[async_trait]
impl AgentPort for RealAgent {
    async fn invoke(
        &self,
        stage: &StageSpec,
        vars: &StageVars,
    ) -> Result<serde_json::Value, AgentError> {
        let user_prompt = prompts::render(stage.user_template, vars);
        let messages = [
            Message::system(stage.system_prompt),
            Message::user(user_prompt),
        ];

        let output = self.llm.complete(&messages).await?;

        let json_str = extract_json(&output);
        serde_json::from_str(json_str).map_err(|e| AgentError::SchemaMismatch {
            stage: stage.name.to_string(),
            detail: format!("{e}: {}", preview(json_str)),
        })
    }
}

fn preview(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
