use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;
use crate::models::{AnswerMap, DocumentTree};

/// 提交状态
///
/// ```text
/// UPLOADED → PROCESSING → GRADED → REVIEWED
///                  ↘ ERROR
/// ```
///
/// 任何状态都可以重新进入 PROCESSING（重新评分）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Uploaded,
    Processing,
    Graded,
    Reviewed,
    Error,
}

impl SubmissionStatus {
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (_, Processing) => true,
            (Processing, Graded) | (Processing, Error) => true,
            (Graded, Reviewed) | (Reviewed, Reviewed) => true,
            _ => false,
        }
    }

    /// 校验并执行状态迁移
    pub fn transition(self, next: SubmissionStatus) -> Result<SubmissionStatus, PipelineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PipelineError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionStatus::Uploaded => "UPLOADED",
            SubmissionStatus::Processing => "PROCESSING",
            SubmissionStatus::Graded => "GRADED",
            SubmissionStatus::Reviewed => "REVIEWED",
            SubmissionStatus::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// 提交记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub assignment_id: String,
    /// 原始提交内容（LaTeX / 纯文本）
    pub content: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub answers: Option<AnswerMap>,
    #[serde(default)]
    pub total_score: u32,
}

impl SubmissionRecord {
    /// 新上传的提交，初始状态为 UPLOADED
    pub fn uploaded(
        id: impl Into<String>,
        assignment_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            assignment_id: assignment_id.into(),
            content: content.into(),
            status: SubmissionStatus::Uploaded,
            answers: None,
            total_score: 0,
        }
    }
}

/// 作业记录：教师提供的参考答案树和评分细则树
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    pub answer_key: DocumentTree,
    pub rubric: DocumentTree,
    pub max_points: u32,
}

#[cfg(test)]
mod tests {
    use super::SubmissionStatus::*;

    #[test]
    fn test_pipeline_transitions() {
        assert_eq!(Uploaded.transition(Processing).unwrap(), Processing);
        assert_eq!(Processing.transition(Graded).unwrap(), Graded);
        assert_eq!(Processing.transition(Error).unwrap(), Error);
    }

    #[test]
    fn test_regrade_reenters_processing_from_any_state() {
        for status in [Uploaded, Processing, Graded, Reviewed, Error] {
            assert!(status.can_transition_to(Processing), "{} 应可重新评分", status);
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(Uploaded.transition(Graded).is_err());
        assert!(Error.transition(Reviewed).is_err());
        assert!(Uploaded.transition(Reviewed).is_err());
        assert!(Graded.transition(Error).is_err());
        assert!(Graded.can_transition_to(Reviewed));
    }
}
