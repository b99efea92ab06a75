//! PrepMate - 就诊准备助手
//!
//! 入口：初始化日志、加载配置、组装流水线，对命令行给出的症状描述跑一遍
//! 两阶段流程（追问用占位应答），打印准备单文本。HTTP / UI 由宿主平台承担。

use anyhow::Context;
use prepmate::config::load_config;
use prepmate::pipeline::{GenerateRequest, Pipeline, SuggestRequest};
use prepmate::session::{Answer, PatientInfo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    prepmate::observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let consent = if let Some(pos) = args.iter().position(|a| a == "--consent") {
        args.remove(pos);
        true
    } else {
        false
    };
    let symptom_text = if args.is_empty() {
        "cough for 3 days".to_string()
    } else {
        args.join(" ")
    };

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({e}), using defaults");
        Default::default()
    });
    let pipeline = Pipeline::from_config(&cfg);

    let suggested = pipeline
        .suggest(SuggestRequest {
            patient_info: PatientInfo::default(),
            initial_input_text: symptom_text,
            language_code: None,
            consent,
            session_id: None,
        })
        .await
        .context("Suggest stage failed")?;

    println!("Session: {}", suggested.session_id);
    println!("Summary: {}", suggested.summary);
    println!("Follow-up questions:");
    for q in &suggested.questions {
        println!("  [{}] {}", q.id, q.label);
    }

    // 演示用占位应答；真实前端会收集用户输入
    let answers: Vec<Answer> = suggested
        .questions
        .iter()
        .map(|q| Answer {
            id: q.id.clone(),
            answer: "(not answered)".to_string(),
        })
        .collect();

    let generated = pipeline
        .generate(GenerateRequest {
            session_id: suggested.session_id,
            patient_info: PatientInfo::default(),
            summary: suggested.summary,
            questions: suggested.questions,
            answers,
            language_code: None,
            consent,
        })
        .await
        .context("Generate stage failed")?;

    println!("\n{}", generated.prep_sheet_text);
    match generated.pdf_url {
        Some(url) => println!("PDF: {url}"),
        None => println!("PDF: (not available)"),
    }

    Ok(())
}
