//! MockAgent（无凭据时的确定性替身）
//!
//! 不走网络，输出只由输入变量决定：相同输入必得字节相同的输出，
//! 流水线因此可以离线测试。内容保真度以外，对调用方与真实模式不可区分。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{AgentError, AgentPort};
use crate::stage::{var, StageSpec, StageVars};

/// Mock Agent：suggest 回显症状为模板化摘要 + 固定问题集，generate 产出模板化 HTML
#[derive(Debug, Default)]
pub struct MockAgent;

impl MockAgent {
    fn suggest(vars: &StageVars) -> Value {
        let symptom = var(vars, "symptom_description").trim();
        json!({
            "summary": format!("Patient reports: {symptom}."),
            "questions": [
                {"id": "q1", "label": "When did the symptoms start?", "type": "text"},
                {"id": "q2", "label": "Rate the pain from 1-10", "type": "scale", "min": 1, "max": 10},
                {"id": "q3", "label": "Any fever or vomiting?", "type": "choice", "options": ["Yes", "No"]}
            ]
        })
    }

    fn generate(vars: &StageVars) -> Value {
        let summary = var(vars, "summary");
        let patient: Value =
            serde_json::from_str(var(vars, "patient_info")).unwrap_or_else(|_| json!({}));
        let field = |key: &str| -> String {
            match patient.get(key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "N/A".to_string(),
            }
        };

        let html = format!(
            r#"<html>
<head><style>body {{ font-family: Arial, sans-serif; margin: 20px; }} h1 {{ color: #2c3e50; }} .section {{ margin: 20px 0; }}</style></head>
<body>
<h1>Doctor Appointment Prep Sheet</h1>
<p><em>This is a communication aid, not medical advice.</em></p>
<div class="section">
<h2>Patient Information</h2>
<p><strong>Name:</strong> {name}</p>
<p><strong>Age:</strong> {age}</p>
<p><strong>Gender:</strong> {gender}</p>
<p><strong>Allergies:</strong> {allergies}</p>
<p><strong>Medications:</strong> {medications}</p>
</div>
<div class="section">
<h2>Symptom Summary</h2>
<p>{summary}</p>
</div>
</body>
</html>"#,
            name = field("name"),
            age = field("age"),
            gender = field("gender"),
            allergies = field("allergies"),
            medications = field("medications"),
        );

        json!({
            "html": html,
            "text": "Doctor Appointment Prep Sheet (mock) - review symptoms and questions."
        })
    }
}

#[async_trait]
impl AgentPort for MockAgent {
    async fn invoke(
        &self,
        stage: &StageSpec,
        vars: &StageVars,
    ) -> Result<Value, AgentError> {
        Ok(match stage.name {
            "generate" => Self::generate(vars),
            _ => Self::suggest(vars),
        })
    }
}
