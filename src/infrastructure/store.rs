//! 评分存储 - 基础设施层
//!
//! 持久化是外部协作者：流水线只通过 load / replace / update 操作访问它，
//! 不关心数据落在哪里。`MemoryStore` 是进程内实现，批处理和测试都用它。

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{AnswerMap, AssignmentRecord, GradeRow, SubmissionRecord, SubmissionStatus};

/// 评分存储
#[async_trait]
pub trait GradingStore: Send + Sync {
    async fn load_submission(&self, submission_id: &str) -> Result<SubmissionRecord, StoreError>;

    async fn load_assignment(&self, assignment_id: &str) -> Result<AssignmentRecord, StoreError>;

    /// 覆盖提交的切分结果
    async fn replace_answers(&self, submission_id: &str, answers: AnswerMap) -> Result<(), StoreError>;

    /// 删除该提交的全部评分记录后插入新的一组
    async fn replace_grades(&self, submission_id: &str, rows: Vec<GradeRow>) -> Result<(), StoreError>;

    async fn load_grades(&self, submission_id: &str) -> Result<Vec<GradeRow>, StoreError>;

    /// 覆盖单条评分记录（按题号定位）
    async fn update_grade(&self, row: GradeRow) -> Result<(), StoreError>;

    async fn update_status(&self, submission_id: &str, status: SubmissionStatus) -> Result<(), StoreError>;

    async fn update_total_score(&self, submission_id: &str, total_score: u32) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    submissions: HashMap<String, SubmissionRecord>,
    assignments: HashMap<String, AssignmentRecord>,
    grades: HashMap<String, Vec<GradeRow>>,
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_assignment(&self, assignment: AssignmentRecord) {
        let mut tables = self.tables.write().await;
        tables.assignments.insert(assignment.id.clone(), assignment);
    }

    pub async fn insert_submission(&self, submission: SubmissionRecord) {
        let mut tables = self.tables.write().await;
        tables.submissions.insert(submission.id.clone(), submission);
    }

    fn submission_mut<'a>(
        tables: &'a mut Tables,
        submission_id: &str,
    ) -> Result<&'a mut SubmissionRecord, StoreError> {
        tables
            .submissions
            .get_mut(submission_id)
            .ok_or_else(|| StoreError::submission_not_found(submission_id))
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn load_submission(&self, submission_id: &str) -> Result<SubmissionRecord, StoreError> {
        let tables = self.tables.read().await;
        tables
            .submissions
            .get(submission_id)
            .cloned()
            .ok_or_else(|| StoreError::submission_not_found(submission_id))
    }

    async fn load_assignment(&self, assignment_id: &str) -> Result<AssignmentRecord, StoreError> {
        let tables = self.tables.read().await;
        tables
            .assignments
            .get(assignment_id)
            .cloned()
            .ok_or_else(|| StoreError::assignment_not_found(assignment_id))
    }

    async fn replace_answers(&self, submission_id: &str, answers: AnswerMap) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        Self::submission_mut(&mut tables, submission_id)?.answers = Some(answers);
        Ok(())
    }

    async fn replace_grades(&self, submission_id: &str, rows: Vec<GradeRow>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        Self::submission_mut(&mut tables, submission_id)?;
        let removed = tables.grades.remove(submission_id).map_or(0, |old| old.len());
        debug!(
            "提交 {} 删除 {} 条旧评分，写入 {} 条",
            submission_id,
            removed,
            rows.len()
        );
        tables.grades.insert(submission_id.to_string(), rows);
        Ok(())
    }

    async fn load_grades(&self, submission_id: &str) -> Result<Vec<GradeRow>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.submissions.contains_key(submission_id) {
            return Err(StoreError::submission_not_found(submission_id));
        }
        Ok(tables.grades.get(submission_id).cloned().unwrap_or_default())
    }

    async fn update_grade(&self, row: GradeRow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .grades
            .get_mut(&row.submission_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.question_no == row.question_no))
            .ok_or_else(|| StoreError::grade_not_found(format!("{}/{}", row.submission_id, row.question_no)))?;
        *slot = row;
        Ok(())
    }

    async fn update_status(&self, submission_id: &str, status: SubmissionStatus) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        Self::submission_mut(&mut tables, submission_id)?.status = status;
        Ok(())
    }

    async fn update_total_score(&self, submission_id: &str, total_score: u32) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        Self::submission_mut(&mut tables, submission_id)?.total_score = total_score;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentKind, DocumentTree, GradingResult};

    fn row(submission_id: &str, question_no: &str, score: u32) -> GradeRow {
        GradeRow::from_result(
            submission_id,
            question_no,
            10,
            &GradingResult::clamped(score as i64, 10, "", "", true),
        )
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_submission("s1").await,
            Err(StoreError::NotFound { entity: "提交", .. })
        ));
        assert!(store.load_assignment("a1").await.is_err());
        assert!(store.update_status("s1", SubmissionStatus::Processing).await.is_err());
        assert!(store.replace_grades("s1", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_grades_supersedes() {
        let store = MemoryStore::new();
        store.insert_submission(SubmissionRecord::uploaded("s1", "a1", "...")).await;

        store
            .replace_grades("s1", vec![row("s1", "1", 3), row("s1", "2", 4)])
            .await
            .unwrap();
        store.replace_grades("s1", vec![row("s1", "1", 7)]).await.unwrap();

        let grades = store.load_grades("s1").await.unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].ai_score, 7);
    }

    #[tokio::test]
    async fn test_update_grade_by_question() {
        let store = MemoryStore::new();
        store.insert_submission(SubmissionRecord::uploaded("s1", "a1", "...")).await;
        store.replace_grades("s1", vec![row("s1", "1", 3)]).await.unwrap();

        let mut updated = row("s1", "1", 3);
        updated.final_score = 9;
        store.update_grade(updated).await.unwrap();
        assert_eq!(store.load_grades("s1").await.unwrap()[0].final_score, 9);

        assert!(store.update_grade(row("s1", "9", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_status_and_assignment_round_trip() {
        let store = MemoryStore::new();
        store.insert_submission(SubmissionRecord::uploaded("s1", "a1", "...")).await;
        store
            .insert_assignment(AssignmentRecord {
                id: "a1".into(),
                answer_key: DocumentTree::empty(DocumentKind::AnswerKey),
                rubric: DocumentTree::empty(DocumentKind::Rubric),
                max_points: 0,
            })
            .await;

        store.update_status("s1", SubmissionStatus::Processing).await.unwrap();
        store.update_total_score("s1", 12).await.unwrap();

        let submission = store.load_submission("s1").await.unwrap();
        assert_eq!(submission.status, SubmissionStatus::Processing);
        assert_eq!(submission.total_score, 12);
        assert_eq!(store.load_assignment("a1").await.unwrap().id, "a1");
    }
}
