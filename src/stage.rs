//! 阶段配置：SuggestStage / GenerateStage
//!
//! 每个阶段 = 固定 Prompt 模板 + 期望输出 schema 的一个 Agent Port 配置。
//! parse 把 Agent 返回的 JSON 按 schema 解析为类型化结构；不做静默纠偏，
//! 解析失败即 SchemaMismatch。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{prompts, AgentError};
use crate::session::{Answer, PatientInfo, Question};

/// 阶段变量表：key 固定，由各阶段的 vars() 组装
pub type StageVars = Vec<(&'static str, String)>;

/// 阶段规格：名称（角色）+ system 指令 + user 模板
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub user_template: &'static str,
}

/// SuggestStage 输出 schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestOutput {
    pub summary: String,
    /// 兼容两种键名（Gemini 侧指令历史用过 followupQuestions）
    #[serde(alias = "followupQuestions")]
    pub questions: Vec<Question>,
}

/// GenerateStage 输出 schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOutput {
    #[serde(alias = "prep_sheet_html")]
    pub html: String,
    #[serde(alias = "prep_sheet_text")]
    pub text: String,
}

/// 摘要 + 追问生成阶段
pub struct SuggestStage;

impl SuggestStage {
    pub const SPEC: StageSpec = StageSpec {
        name: "suggest",
        system_prompt: prompts::SUGGEST_SYSTEM,
        user_template: prompts::SUGGEST_USER,
    };

    pub fn vars(patient_info: &PatientInfo, symptom_description: &str, language: &str) -> StageVars {
        vec![
            ("patient_info", patient_info_json(patient_info)),
            ("symptom_description", symptom_description.to_string()),
            ("language", language.to_string()),
        ]
    }

    pub fn parse(value: Value) -> Result<SuggestOutput, AgentError> {
        serde_json::from_value(value).map_err(|e| AgentError::SchemaMismatch {
            stage: Self::SPEC.name.to_string(),
            detail: e.to_string(),
        })
    }
}

/// 准备单生成阶段
pub struct GenerateStage;

impl GenerateStage {
    pub const SPEC: StageSpec = StageSpec {
        name: "generate",
        system_prompt: prompts::GENERATE_SYSTEM,
        user_template: prompts::GENERATE_USER,
    };

    pub fn vars(
        summary: &str,
        answers: &[Answer],
        patient_info: &PatientInfo,
        language: &str,
    ) -> StageVars {
        vec![
            ("summary", summary.to_string()),
            (
                "followup_answers",
                serde_json::to_string(answers).unwrap_or_else(|_| "[]".to_string()),
            ),
            ("patient_info", patient_info_json(patient_info)),
            ("language", language.to_string()),
        ]
    }

    pub fn parse(value: Value) -> Result<GenerateOutput, AgentError> {
        serde_json::from_value(value).map_err(|e| AgentError::SchemaMismatch {
            stage: Self::SPEC.name.to_string(),
            detail: e.to_string(),
        })
    }
}

fn patient_info_json(patient_info: &PatientInfo) -> String {
    serde_json::to_string(patient_info).unwrap_or_else(|_| "{}".to_string())
}

/// 在变量表中取值，缺省为空串（Mock 侧也用）
pub fn var<'a>(vars: &'a StageVars, key: &str) -> &'a str {
    vars.iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}
