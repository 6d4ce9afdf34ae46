use async_trait::async_trait;
use auto_grader::clients::{GradingOracle, OracleRequest};
use auto_grader::config::{Config, ParseStrategyKind};
use auto_grader::error::OracleError;
use auto_grader::models::{load_job_file, GradingJob, SubmissionStatus};
use auto_grader::workflow::{apply_review, ReviewUpdate};
use auto_grader::orchestrator::submission_key;
use auto_grader::{App, GradingStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// 学生答案与参考答案一致时给满分，否则给一半分
struct ExactMatchOracle {
    calls: AtomicUsize,
}

impl ExactMatchOracle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

fn section<'a>(prompt: &'a str, header: &str, next: &str) -> &'a str {
    let start = prompt.find(header).map_or(0, |i| i + header.len());
    let end = prompt[start..].find(next).map_or(prompt.len(), |i| start + i);
    prompt[start..end].trim()
}

#[async_trait]
impl GradingOracle for ExactMatchOracle {
    fn model_name(&self) -> &str {
        "exact-match"
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &request.user;
        let reference = section(prompt, "ANSWER KEY:", "STUDENT ANSWER:");
        let answer = section(prompt, "STUDENT ANSWER:", "GRADING RUBRIC:");
        let max: u32 = section(prompt, "MAXIMUM POINTS:", "\n").parse().unwrap_or(0);

        let reply = if reference == answer {
            serde_json::json!({"score": max, "feedback": "", "reasoning": "matches", "satisfies_rubric": true})
        } else {
            serde_json::json!({"score": max / 2, "feedback": "Check your work.", "satisfies_rubric": false})
        };
        // 模型经常把 JSON 包在代码块里
        Ok(format!("```json\n{}\n```", reply))
    }
}

const INLINE_JOB: &str = r#"
[assignment]
id = "geo"

[assignment.answer_key]
q1 = "Paris"
q2 = "42"

[assignment.rubric.q1]
max_points = 5

[assignment.rubric.q2]
max_points = 5

[[submissions]]
id = "alice"
content = '''
\documentclass{article}
\begin{document}
\section{Question 1}
Paris
\section{Question 2}
42
\end{document}
'''

[[submissions]]
id = "bob"
content = '''
Q1: Paris
Q2: 41
Q9: extra credit
'''

[[submissions]]
id = "carol"
content = ""
"#;

const DOCUMENT_JOB: &str = r#"
[assignment]
id = "alg"

answer_key_document = '''
\section{Problem 1}
x = 2
\section{Problem 2}
(a) 3
(b) 4
'''

rubric_document = '''
\section{Problem 1}
Correct root. 4 points
\section{Problem 2}
(a) first value (3 points)
(b) second value (3 points)
'''

[[submissions]]
id = "dave"
content = '''
\section{Problem 1}
x = 2
\section{Problem 2}
(a) 3
(b) 5
'''
"#;

async fn load(content: &str) -> GradingJob {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.toml");
    std::fs::write(&path, content).unwrap();
    load_job_file(&path).await.unwrap()
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        output_log_file: dir.path().join("grading_output.txt").to_string_lossy().to_string(),
        parse_strategy: ParseStrategyKind::Heuristic,
        max_concurrent_submissions: 2,
        max_concurrent_questions: 2,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_batch_grading_with_inline_answer_key() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ExactMatchOracle::new();
    let app = App::with_oracle(test_config(&dir), Some(oracle.clone()));
    let job = load(INLINE_JOB).await;

    let stats = assert_ok!(app.grade_jobs(&[job]).await);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.graded, 2);
    assert_eq!(stats.failed, 1);

    let store = app.store();

    let alice = store.load_submission("geo/alice").await.unwrap();
    assert_eq!(alice.status, SubmissionStatus::Graded);
    assert_eq!(alice.total_score, 10);
    let rows = store.load_grades("geo/alice").await.unwrap();
    assert!(rows.iter().all(|r| r.ai_satisfies_rubric && r.ai_feedback.is_empty()));

    // q2 答错得一半分，q9 匹配不到记零分
    let bob = store.load_submission("geo/bob").await.unwrap();
    assert_eq!(bob.status, SubmissionStatus::Graded);
    assert_eq!(bob.total_score, 7);
    let rows = store.load_grades("geo/bob").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].question_no, "9");
    assert_eq!(rows[2].diagnostic.as_deref(), Some("identifier_mismatch"));
    assert!(!rows[1].ai_feedback.is_empty());

    let carol = store.load_submission("geo/carol").await.unwrap();
    assert_eq!(carol.status, SubmissionStatus::Error);

    // 匹配失败和空提交都不会调用模型
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);

    let log = std::fs::read_to_string(dir.path().join("grading_output.txt")).unwrap();
    assert!(log.contains("提交 geo/alice"));
    assert!(log.contains("提交 geo/carol | 失败"));
}

#[tokio::test]
async fn test_batch_grading_with_parsed_documents() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_oracle(test_config(&dir), Some(ExactMatchOracle::new()));
    let job = load(DOCUMENT_JOB).await;

    let assignment = app.build_assignment(&job.assignment).await;
    assert_eq!(assignment.answer_key.ids(), vec!["1", "2", "2.a", "2.b"]);
    assert_eq!(assignment.rubric.find("2").unwrap().max_points, 6);
    assert_eq!(assignment.max_points, 10);

    let stats = assert_ok!(app.grade_jobs(&[job]).await);
    assert_eq!(stats.graded, 1);

    let rows = app.store().load_grades("alg/dave").await.unwrap();
    let scores: Vec<(String, u32)> = rows.iter().map(|r| (r.question_no.clone(), r.ai_score)).collect();
    assert_eq!(
        scores,
        vec![
            ("1".to_string(), 4),
            ("2.a".to_string(), 3),
            ("2.b".to_string(), 1)
        ]
    );
    assert_eq!(app.store().load_submission("alg/dave").await.unwrap().total_score, 8);
}

#[tokio::test]
async fn test_review_after_batch() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_oracle(test_config(&dir), Some(ExactMatchOracle::new()));
    let job = load(INLINE_JOB).await;
    assert_ok!(app.grade_jobs(&[job]).await);

    let store = app.store().as_ref();
    let total = assert_ok!(
        apply_review(
            store,
            "geo/bob",
            ReviewUpdate {
                question_no: "2".into(),
                final_score: 5,
                final_feedback: Some("Accepted after review".into()),
            },
        )
        .await
    );
    assert_eq!(total, 10);
    assert_eq!(
        store.load_submission("geo/bob").await.unwrap().status,
        SubmissionStatus::Reviewed
    );

    // ERROR 状态的提交不能复核
    assert_err!(
        apply_review(
            store,
            "geo/carol",
            ReviewUpdate {
                question_no: "1".into(),
                final_score: 1,
                final_feedback: None,
            },
        )
        .await
    );
}

#[tokio::test]
async fn test_without_oracle_everything_needs_review() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_oracle(test_config(&dir), None);
    let job = load(INLINE_JOB).await;

    let stats = assert_ok!(app.grade_jobs(&[job]).await);
    assert_eq!(stats.graded, 2);

    let rows = app.store().load_grades("geo/alice").await.unwrap();
    assert!(rows.iter().all(|r| r.ai_score == 0 && r.diagnostic.is_some()));
}

#[tokio::test]
async fn test_same_student_in_two_assignments_is_kept_apart() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_oracle(test_config(&dir), Some(ExactMatchOracle::new()));
    let first = load(INLINE_JOB).await;
    let mut second = load(INLINE_JOB).await;
    second.assignment.id = "geo2".into();
    second.assignment.answer_key.insert("q2".into(), "41".into());
    second.submissions.retain(|s| s.id == "bob");

    let stats = assert_ok!(app.grade_jobs(&[first, second]).await);
    assert_eq!(stats.total, 4);
    assert_eq!(stats.graded, 3);

    let store = app.store();
    let first_bob = store.load_submission(&submission_key("geo", "bob")).await.unwrap();
    let second_bob = store.load_submission(&submission_key("geo2", "bob")).await.unwrap();
    assert_eq!(first_bob.assignment_id, "geo");
    assert_eq!(second_bob.assignment_id, "geo2");
    assert_eq!(first_bob.total_score, 7);
    // 第二份作业里 q2 的参考答案就是 41
    assert_eq!(second_bob.total_score, 10);
}

#[tokio::test]
async fn test_duplicate_assignment_and_submission_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ExactMatchOracle::new();
    let app = App::with_oracle(test_config(&dir), Some(oracle.clone()));
    let mut job = load(INLINE_JOB).await;
    let extra = job.submissions[0].clone();
    job.submissions.push(extra);
    let again = load(INLINE_JOB).await;

    let stats = assert_ok!(app.grade_jobs(&[job, again]).await);
    // 4 份提交 + 重复作业的 3 份提交
    assert_eq!(stats.total, 7);
    assert_eq!(stats.graded, 2);
    assert_eq!(stats.failed, 5);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
}
