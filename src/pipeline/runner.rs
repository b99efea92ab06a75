//! 流水线主控：两个对外操作 suggest / generate
//!
//! 每次操作是独立的无状态请求：Pipeline 先做校验（fail fast），再调阶段（失败则
//! 会话入 Failed 并上抛类型化错误），成功后原子折入结果；副作用（落库 / 渲染 /
//! 上传）全部经同意门，且各自尽力而为，失败只降级响应、不回滚已产出的主产物。

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::agent::{create_agent_from_config, AgentPort};
use crate::config::AppConfig;
use crate::pipeline::PipelineError;
use crate::session::{Answer, PatientInfo, PrepSession, Question, SessionError};
use crate::stage::{GenerateStage, SuggestStage};
use crate::tools::{
    renderer_from_config, object_store_from_config, session_store_from_config, ConsentGate,
    ObjectStore, SessionStore, SessionUpdate, SheetRenderer, ToolAvailability,
};

impl From<SessionError> for PipelineError {
    fn from(e: SessionError) -> Self {
        PipelineError::Validation(e.to_string())
    }
}

/// suggest 请求：首次提交（session_id 仅在 caller 重放快照时携带）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
    pub patient_info: PatientInfo,
    pub initial_input_text: String,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub consent: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// suggest 响应：会话快照的前半段，caller 原样回显给 generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub session_id: String,
    pub summary: String,
    pub questions: Vec<Question>,
}

/// generate 请求：携带完整快照（会话可能从未落库，流水线必须容忍无状态 caller）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub session_id: String,
    pub patient_info: PatientInfo,
    pub summary: String,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

/// generate 响应：pdf_url 仅在同意成立且渲染、上传都成功时出现
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub session_id: String,
    pub prep_sheet_html: String,
    pub prep_sheet_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
}

/// 会话流水线：持有四个端口，自身无跨请求状态
pub struct Pipeline {
    agent: Arc<dyn AgentPort>,
    store: Arc<dyn SessionStore>,
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn SheetRenderer>,
    default_language: String,
}

impl Pipeline {
    pub fn new(
        agent: Arc<dyn AgentPort>,
        store: Arc<dyn SessionStore>,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn SheetRenderer>,
        default_language: String,
    ) -> Self {
        Self {
            agent,
            store,
            objects,
            renderer,
            default_language,
        }
    }

    /// 按配置组装：Agent 模式与各端口可用性都在此一次性确定
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            create_agent_from_config(cfg),
            session_store_from_config(cfg),
            object_store_from_config(cfg),
            renderer_from_config(cfg),
            cfg.app.default_language.clone(),
        )
    }

    fn language(&self, requested: Option<String>) -> String {
        requested
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.default_language.clone())
    }

    /// Created → Suggested：校验输入，跑 SuggestStage，同意成立时尽力落库
    pub async fn suggest(&self, req: SuggestRequest) -> Result<SuggestResponse, PipelineError> {
        if req.initial_input_text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "initial_input_text is required".to_string(),
            ));
        }

        let mut session = PrepSession::new(
            req.session_id,
            req.patient_info,
            req.initial_input_text,
            self.language(req.language_code),
        );
        tracing::info!("Session {} created (lang {})", session.id, session.language_code);

        let vars = SuggestStage::vars(
            &session.patient_info,
            &session.initial_input_text,
            &session.language_code,
        );
        let output = match self
            .agent
            .invoke(&SuggestStage::SPEC, &vars)
            .await
            .and_then(SuggestStage::parse)
        {
            Ok(output) => output,
            Err(e) => {
                session.mark_failed();
                tracing::error!("Session {} failed in suggest stage: {e}", session.id);
                return Err(e.into());
            }
        };

        session.apply_suggestion(output.summary.clone(), output.questions.clone())?;
        session.consent_to_store = req.consent;

        if ConsentGate::allows(req.consent) {
            match self.store.availability() {
                ToolAvailability::Available => {
                    // 落库尽力而为：失败只记告警，不阻塞响应
                    if let Err(e) = self.store.create(&session).await {
                        tracing::warn!("Session {} create degraded: {e}", session.id);
                    }
                }
                ToolAvailability::Disabled { reason } => {
                    tracing::warn!("Consent given but session store disabled: {reason}");
                }
            }
        }

        Ok(SuggestResponse {
            session_id: session.id,
            summary: output.summary,
            questions: output.questions,
        })
    }

    /// Answered → Generated（→ Persisted）：快照重建会话，跑 GenerateStage，
    /// 同意成立时依次渲染、上传、落库（相互独立的尽力而为副作用）
    pub async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        if req.summary.trim().is_empty() {
            return Err(PipelineError::Validation("summary is required".to_string()));
        }

        let mut session = PrepSession::from_snapshot(
            req.session_id,
            req.patient_info,
            req.summary,
            req.questions,
            self.language(req.language_code),
        );
        // 引用校验先于任何阶段调用（fail fast，无部分状态）
        session.attach_answers(req.answers)?;

        let vars = GenerateStage::vars(
            session.ai_summary.as_deref().unwrap_or_default(),
            &session.followup_data.answers,
            &session.patient_info,
            &session.language_code,
        );
        let output = match self
            .agent
            .invoke(&GenerateStage::SPEC, &vars)
            .await
            .and_then(GenerateStage::parse)
        {
            Ok(output) => output,
            Err(e) => {
                session.mark_failed();
                tracing::error!("Session {} failed in generate stage: {e}", session.id);
                return Err(e.into());
            }
        };

        session.apply_sheet(output.html.clone(), output.text.clone())?;
        session.consent_to_store = req.consent;

        let mut pdf_bytes: Option<Vec<u8>> = None;
        let mut pdf_url: Option<String> = None;

        if ConsentGate::allows(req.consent) {
            if self.renderer.availability().is_available() {
                match self.renderer.to_pdf(&output.html).await {
                    Ok(bytes) => pdf_bytes = Some(bytes),
                    Err(e) => tracing::warn!("Session {} pdf render degraded: {e}", session.id),
                }
            }

            if let Some(bytes) = &pdf_bytes {
                if self.objects.availability().is_available() {
                    let name = format!("prep-sheets/{}.pdf", session.id);
                    match self.objects.upload(bytes, &name).await {
                        Ok(url) => {
                            session.set_pdf_url(url.clone());
                            pdf_url = Some(url);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Session {} pdf upload degraded, pdf_url omitted: {e}",
                                session.id
                            );
                        }
                    }
                }
            }

            match self.store.availability() {
                ToolAvailability::Available => {
                    let update = SessionUpdate {
                        answers: session.followup_data.answers.clone(),
                        final_output_html: output.html.clone(),
                        final_output_text: output.text.clone(),
                        pdf_url: pdf_url.clone(),
                        updated_at: session.updated_at.clone(),
                    };
                    match self.store.update(&session.id, update).await {
                        Ok(()) => session.mark_persisted(),
                        Err(e) => {
                            tracing::warn!("Session {} update degraded: {e}", session.id)
                        }
                    }
                }
                ToolAvailability::Disabled { reason } => {
                    tracing::warn!("Consent given but session store disabled: {reason}");
                }
            }
        }

        Ok(GenerateResponse {
            session_id: session.id,
            prep_sheet_html: output.html,
            prep_sheet_text: output.text,
            pdf_url,
            pdf_base64: pdf_bytes.map(|b| general_purpose::STANDARD.encode(b)),
        })
    }
}
