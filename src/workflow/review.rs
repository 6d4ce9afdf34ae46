//! 人工复核
//!
//! 教师可以覆盖单题的最终分数和反馈，不需要重新跑评分流程。
//! AI 给出的原始结果保持不变。

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, StoreError};
use crate::infrastructure::GradingStore;
use crate::models::{sum_points, SubmissionStatus};

/// 一条复核意见
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub question_no: String,
    pub final_score: u32,
    #[serde(default)]
    pub final_feedback: Option<String>,
}

/// 应用复核意见，返回新的总分
///
/// 分数截断到该题满分；总分按所有题目的最终分数重新汇总。
/// 只有 GRADED 或 REVIEWED 状态的提交可以复核。
pub async fn apply_review(
    store: &dyn GradingStore,
    submission_id: &str,
    update: ReviewUpdate,
) -> Result<u32, PipelineError> {
    let submission = store.load_submission(submission_id).await?;
    let status = submission.status.transition(SubmissionStatus::Reviewed)?;

    let mut row = store
        .load_grades(submission_id)
        .await?
        .into_iter()
        .find(|row| row.question_no == update.question_no)
        .ok_or_else(|| StoreError::grade_not_found(format!("{}/{}", submission_id, update.question_no)))?;

    row.final_score = update.final_score.min(row.max_points);
    if let Some(feedback) = update.final_feedback {
        row.final_feedback = feedback;
    }
    row.human_reviewed = true;
    info!(
        "[提交 {}] 👀 题号 {} 人工复核: {} → {}",
        submission_id, row.question_no, row.ai_score, row.final_score
    );
    store.update_grade(row).await?;

    let rows = store.load_grades(submission_id).await?;
    let total_score = sum_points(rows.iter().map(|row| row.final_score));
    store.update_total_score(submission_id, total_score).await?;
    store.update_status(submission_id, status).await?;
    Ok(total_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryStore;
    use crate::models::{GradeRow, GradingResult, SubmissionRecord};

    async fn graded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_submission(SubmissionRecord::uploaded("s1", "a1", "..."))
            .await;
        let rows = vec![
            GradeRow::from_result("s1", "1", 5, &GradingResult::clamped(2, 5, "partial", "", false)),
            GradeRow::from_result("s1", "2", 5, &GradingResult::clamped(5, 5, "", "", true)),
        ];
        store.replace_grades("s1", rows).await.unwrap();
        store.update_total_score("s1", 7).await.unwrap();
        store.update_status("s1", SubmissionStatus::Graded).await.unwrap();
        store
    }

    fn update(question_no: &str, final_score: u32) -> ReviewUpdate {
        ReviewUpdate {
            question_no: question_no.to_string(),
            final_score,
            final_feedback: Some("reviewed".to_string()),
        }
    }

    #[tokio::test]
    async fn test_review_overrides_final_fields_only() {
        let store = graded_store().await;

        let total = apply_review(&store, "s1", update("1", 4)).await.unwrap();
        assert_eq!(total, 9);

        let rows = store.load_grades("s1").await.unwrap();
        assert_eq!(rows[0].ai_score, 2);
        assert_eq!(rows[0].final_score, 4);
        assert_eq!(rows[0].final_feedback, "reviewed");
        assert!(rows[0].human_reviewed);

        let submission = store.load_submission("s1").await.unwrap();
        assert_eq!(submission.status, SubmissionStatus::Reviewed);
        assert_eq!(submission.total_score, 9);
    }

    #[tokio::test]
    async fn test_review_clamps_and_repeats() {
        let store = graded_store().await;
        apply_review(&store, "s1", update("1", 4)).await.unwrap();

        let total = apply_review(&store, "s1", update("2", 99)).await.unwrap();
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn test_review_total_saturates() {
        let store = MemoryStore::new();
        store
            .insert_submission(SubmissionRecord::uploaded("s1", "a1", "..."))
            .await;
        let full = GradingResult::clamped(i64::MAX, u32::MAX, "", "", true);
        let rows = vec![
            GradeRow::from_result("s1", "1", u32::MAX, &full),
            GradeRow::from_result("s1", "2", u32::MAX, &full),
        ];
        store.replace_grades("s1", rows).await.unwrap();
        store.update_status("s1", SubmissionStatus::Graded).await.unwrap();

        let total = apply_review(&store, "s1", update("1", 7)).await.unwrap();
        assert_eq!(total, u32::MAX);
    }

    #[tokio::test]
    async fn test_review_requires_graded_submission() {
        let store = graded_store().await;
        store.update_status("s1", SubmissionStatus::Error).await.unwrap();

        let err = apply_review(&store, "s1", update("1", 4)).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_review_unknown_question() {
        let store = graded_store().await;
        let err = apply_review(&store, "s1", update("9", 1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamDataMissing(_)));
    }
}
