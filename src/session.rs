//! PrepSession 聚合与状态机
//!
//! 会话唯一的持久化/瞬态聚合：Created → Suggested → Answered → Generated →（Persisted），
//! Failed 为任意非终态可达的吸收态。字段只由 Pipeline 折入（阶段返回结果，不直接改会话），
//! 每次迁移刷新 updated_at；同意为假时会话只存在于请求生命周期内，从不落库。

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 会话层错误：非法迁移与应答引用校验
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// 应答 id 未对应本会话的任何问题 id（引用不变量）
    #[error("Answer references unknown question id: {0}")]
    UnknownAnswerId(String),

    /// 排序依赖：final_output 只能在 ai_summary 之后产生
    #[error("Prep sheet requires an existing summary")]
    MissingSummary,
}

/// 患者画像：除 age 的数值约束外均为可选自由文本
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
}

/// 追问类型（与 LLM 输出 schema 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Choice,
    Scale,
}

/// 单条追问：choice 携带 options，scale 携带 min/max
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

/// 单条应答，id 必须引用同会话的问题 id
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub id: String,
    pub answer: String,
}

/// 追问数据：问题有序列表 + 应答有序列表（应答在 caller 提交前为空）
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FollowupData {
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

/// 会话状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Suggested,
    Answered,
    Generated,
    Persisted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Generated | SessionState::Persisted | SessionState::Failed
        )
    }
}

/// 就诊准备会话聚合（持久化文档与此结构一一对应）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepSession {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub patient_info: PatientInfo,
    pub language_code: String,
    pub initial_input_text: String,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub followup_data: FollowupData,
    #[serde(default)]
    pub final_output_html: Option<String>,
    #[serde(default)]
    pub final_output_text: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    /// 落库文档固定为 true：无同意的会话从不进入存储
    #[serde(rename = "consentToStore", default)]
    pub consent_to_store: bool,
    #[serde(skip, default = "created_state")]
    pub state: SessionState,
}

fn created_state() -> SessionState {
    SessionState::Created
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl PrepSession {
    /// 创建新会话：id 仅在此分配一次；caller 回显已有 id 时沿用
    pub fn new(
        session_id: Option<String>,
        patient_info: PatientInfo,
        initial_input_text: String,
        language_code: String,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            created_at: now.clone(),
            updated_at: now,
            patient_info,
            language_code,
            initial_input_text,
            ai_summary: None,
            followup_data: FollowupData::default(),
            final_output_html: None,
            final_output_text: None,
            pdf_url: None,
            consent_to_store: false,
            state: SessionState::Created,
        }
    }

    /// 从 caller 回显的快照重建会话（无状态两段式调用：会话可能从未落库）
    pub fn from_snapshot(
        session_id: String,
        patient_info: PatientInfo,
        summary: String,
        questions: Vec<Question>,
        language_code: String,
    ) -> Self {
        let mut session = Self::new(Some(session_id), patient_info, String::new(), language_code);
        session.ai_summary = Some(summary);
        session.followup_data.questions = questions;
        session.state = SessionState::Suggested;
        session
    }

    fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        let allowed = matches!(
            (self.state, to),
            (SessionState::Created, SessionState::Suggested)
                | (SessionState::Suggested, SessionState::Answered)
                | (SessionState::Answered, SessionState::Generated)
                | (SessionState::Generated, SessionState::Persisted)
        );
        if !allowed {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.touch();
        Ok(())
    }

    /// 折入 SuggestStage 结果：摘要 + 问题集一次性写入（原子），Created → Suggested
    pub fn apply_suggestion(
        &mut self,
        summary: String,
        questions: Vec<Question>,
    ) -> Result<(), SessionError> {
        self.transition(SessionState::Suggested)?;
        self.ai_summary = Some(summary);
        self.followup_data.questions = questions;
        Ok(())
    }

    /// 附加 caller 提交的应答，Suggested → Answered；先整体校验引用不变量再写入
    pub fn attach_answers(&mut self, answers: Vec<Answer>) -> Result<(), SessionError> {
        validate_answers(&self.followup_data.questions, &answers)?;
        self.transition(SessionState::Answered)?;
        self.followup_data.answers = answers;
        Ok(())
    }

    /// 折入 GenerateStage 结果：html + text 一次性写入（原子），Answered → Generated
    pub fn apply_sheet(&mut self, html: String, text: String) -> Result<(), SessionError> {
        if self.ai_summary.is_none() {
            return Err(SessionError::MissingSummary);
        }
        self.transition(SessionState::Generated)?;
        self.final_output_html = Some(html);
        self.final_output_text = Some(text);
        Ok(())
    }

    /// 记录上传成功的 PDF 地址（只在同意成立且上传成功时调用）
    pub fn set_pdf_url(&mut self, url: String) {
        self.pdf_url = Some(url);
        self.touch();
    }

    /// 存储更新成功后记为 Persisted（Generated 之外的状态下调用则忽略）
    pub fn mark_persisted(&mut self) {
        if self.state == SessionState::Generated {
            self.state = SessionState::Persisted;
            self.touch();
        }
    }

    /// 任意非终态可入 Failed（吸收态）；已终结的会话保持原状态
    pub fn mark_failed(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
            self.touch();
        }
    }
}

/// 引用不变量：每条应答 id 必须出现在问题 id 中；不匹配即校验错误，不静默丢弃
pub fn validate_answers(questions: &[Question], answers: &[Answer]) -> Result<(), SessionError> {
    for answer in answers {
        if !questions.iter().any(|q| q.id == answer.id) {
            return Err(SessionError::UnknownAnswerId(answer.id.clone()));
        }
    }
    Ok(())
}
