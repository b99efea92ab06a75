//! 流水线集成测试：Mock Agent + 契约替身走完整两阶段流程

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use prepmate::agent::MockAgent;
use prepmate::pipeline::{GenerateRequest, Pipeline, PipelineError, SuggestRequest};
use prepmate::session::{Answer, PatientInfo};
use prepmate::tools::{
    InMemoryStore, ObjectStore, SessionStore, SessionUpdate, SheetRenderer, ToolAvailability,
    ToolError,
};

/// 对象存储替身：计数 + 可配置失败
struct RecordingObjectStore {
    uploads: AtomicUsize,
    fail: bool,
}

impl RecordingObjectStore {
    fn working() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn upload(&self, _data: &[u8], name: &str) -> Result<String, ToolError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ToolError::Failed("bucket exploded".into()))
        } else {
            Ok(format!("https://storage.example.com/{name}"))
        }
    }
}

/// 会话存储替身：声明可用但每次调用都失败，用于验证落库故障不阻塞主流程
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn create(&self, _session: &prepmate::session::PrepSession) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Failed("firestore exploded".into()))
    }

    async fn update(&self, _session_id: &str, _update: SessionUpdate) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Failed("firestore exploded".into()))
    }
}

/// 渲染替身：固定字节
struct StubRenderer;

#[async_trait]
impl SheetRenderer for StubRenderer {
    fn availability(&self) -> ToolAvailability {
        ToolAvailability::Available
    }

    async fn to_pdf(&self, _html: &str) -> Result<Vec<u8>, ToolError> {
        Ok(b"%PDF-stub".to_vec())
    }
}

fn pipeline(
    store: Arc<InMemoryStore>,
    objects: Arc<RecordingObjectStore>,
) -> Pipeline {
    Pipeline::new(
        Arc::new(MockAgent),
        store,
        objects,
        Arc::new(StubRenderer),
        "en".to_string(),
    )
}

fn intake(text: &str, consent: bool) -> SuggestRequest {
    SuggestRequest {
        patient_info: PatientInfo {
            name: Some("Asha".into()),
            age: Some(34),
            ..Default::default()
        },
        initial_input_text: text.to_string(),
        language_code: None,
        consent,
        session_id: None,
    }
}

fn answer_all(
    suggested: &prepmate::pipeline::SuggestResponse,
    consent: bool,
) -> GenerateRequest {
    GenerateRequest {
        session_id: suggested.session_id.clone(),
        patient_info: PatientInfo {
            name: Some("Asha".into()),
            age: Some(34),
            ..Default::default()
        },
        summary: suggested.summary.clone(),
        questions: suggested.questions.clone(),
        answers: suggested
            .questions
            .iter()
            .map(|q| Answer {
                id: q.id.clone(),
                answer: "yes".to_string(),
            })
            .collect(),
        language_code: None,
        consent,
    }
}

#[tokio::test]
async fn test_mock_suggest_is_deterministic() {
    let p = pipeline(
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingObjectStore::working()),
    );
    let a = p.suggest(intake("cough for 3 days", false)).await.unwrap();
    let b = p.suggest(intake("cough for 3 days", false)).await.unwrap();
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.questions, b.questions);
}

#[tokio::test]
async fn test_generate_rejects_unknown_answer_id() {
    let p = pipeline(
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingObjectStore::working()),
    );
    let suggested = p.suggest(intake("cough for 3 days", false)).await.unwrap();

    let mut req = answer_all(&suggested, false);
    req.answers.push(Answer {
        id: "q99".into(),
        answer: "x".into(),
    });
    let err = p.generate(req).await.unwrap_err();
    match err {
        PipelineError::Validation(msg) => assert!(msg.contains("q99")),
        other => panic!("Expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_consent_means_no_side_effects() {
    let store = Arc::new(InMemoryStore::new());
    let objects = Arc::new(RecordingObjectStore::working());
    let p = pipeline(store.clone(), objects.clone());

    let suggested = p.suggest(intake("cough for 3 days", false)).await.unwrap();
    assert!(!suggested.session_id.is_empty());
    assert_eq!(suggested.questions.len(), 3);

    let generated = p.generate(answer_all(&suggested, false)).await.unwrap();
    assert!(!generated.prep_sheet_html.is_empty());
    assert!(generated.pdf_url.is_none());

    // 契约：没有任何调用抵达存储端口
    assert_eq!(store.create_calls(), 0);
    assert_eq!(store.update_calls(), 0);
    assert_eq!(objects.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_upload_degrades_but_keeps_sheet() {
    let store = Arc::new(InMemoryStore::new());
    let objects = Arc::new(RecordingObjectStore::failing());
    let p = pipeline(store.clone(), objects.clone());

    let suggested = p.suggest(intake("cough for 3 days", true)).await.unwrap();
    let generated = p.generate(answer_all(&suggested, true)).await.unwrap();

    // 主产物完整，仅 pdf_url 缺席
    assert!(!generated.prep_sheet_html.is_empty());
    assert!(!generated.prep_sheet_text.is_empty());
    assert!(generated.pdf_url.is_none());
    assert_eq!(objects.uploads.load(Ordering::SeqCst), 1);

    // 落库仍然发生，pdf_url 字段为空
    let stored = store.get(&generated.session_id).unwrap();
    assert!(stored.pdf_url.is_none());
    assert!(stored.final_output_html.is_some());
}

#[tokio::test]
async fn test_consented_end_to_end_with_working_tools() {
    let store = Arc::new(InMemoryStore::new());
    let objects = Arc::new(RecordingObjectStore::working());
    let p = pipeline(store.clone(), objects.clone());

    let suggested = p.suggest(intake("cough for 3 days", true)).await.unwrap();
    let generated = p.generate(answer_all(&suggested, true)).await.unwrap();

    assert_eq!(generated.session_id, suggested.session_id);
    let pdf_url = generated.pdf_url.expect("pdf_url expected with consent");
    assert!(pdf_url.contains(&generated.session_id));
    assert!(generated.pdf_base64.is_some());

    // 同一会话 id：一次 create + 一次 update
    assert_eq!(store.create_calls(), 1);
    assert_eq!(store.update_calls(), 1);
    let stored = store.get(&generated.session_id).unwrap();
    assert_eq!(stored.pdf_url.as_deref(), Some(pdf_url.as_str()));
    assert_eq!(stored.followup_data.answers.len(), 3);
    assert_eq!(
        stored.final_output_html.as_deref(),
        Some(generated.prep_sheet_html.as_str())
    );
    // 排序不变量：final_output 存在时 ai_summary 必然存在
    assert!(stored.ai_summary.is_some());
}

#[tokio::test]
async fn test_failing_store_degrades_but_keeps_artifacts() {
    let store = Arc::new(FailingStore::new());
    let objects = Arc::new(RecordingObjectStore::working());
    let p = Pipeline::new(
        Arc::new(MockAgent),
        store.clone(),
        objects.clone(),
        Arc::new(StubRenderer),
        "en".to_string(),
    );

    let suggested = p.suggest(intake("cough for 3 days", true)).await.unwrap();
    assert_eq!(suggested.questions.len(), 3);

    let generated = p.generate(answer_all(&suggested, true)).await.unwrap();
    assert!(!generated.prep_sheet_html.is_empty());
    assert!(!generated.prep_sheet_text.is_empty());
    // 渲染与上传独立于落库：pdf_url 照常返回
    assert!(generated.pdf_url.is_some());
    assert_eq!(objects.uploads.load(Ordering::SeqCst), 1);

    // 落库确实被尝试过（create + update 各一次），失败只记日志
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_generate_without_summary_rejected() {
    let p = pipeline(
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingObjectStore::working()),
    );
    let suggested = p.suggest(intake("cough for 3 days", false)).await.unwrap();
    let mut req = answer_all(&suggested, false);
    req.summary = "   ".into();
    let err = p.generate(req).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_repeated_generate_last_writer_wins() {
    let store = Arc::new(InMemoryStore::new());
    let objects = Arc::new(RecordingObjectStore::working());
    let p = pipeline(store.clone(), objects.clone());

    let suggested = p.suggest(intake("cough for 3 days", true)).await.unwrap();
    p.generate(answer_all(&suggested, true)).await.unwrap();

    let mut second = answer_all(&suggested, true);
    second.summary = "Worsening cough, now with fever.".into();
    let generated = p.generate(second).await.unwrap();

    // 同一会话 id 两次 generate：存储里只有最后一次的产物
    let stored = store.get(&suggested.session_id).unwrap();
    assert_eq!(
        stored.final_output_html.as_deref(),
        Some(generated.prep_sheet_html.as_str())
    );
    assert_eq!(store.update_calls(), 2);
}

#[tokio::test]
async fn test_language_threaded_through_snapshot() {
    let p = pipeline(
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingObjectStore::working()),
    );
    let mut req = intake("cough for 3 days", false);
    req.language_code = Some("kn-IN".into());
    let suggested = p.suggest(req).await.unwrap();
    // Mock 摘要回显症状；语言标签本身不改变输出结构
    assert!(suggested.summary.contains("cough for 3 days"));
}
