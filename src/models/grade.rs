use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;

/// 单题评分结果
///
/// `score` 永远位于 `[0, max_points]`；降级结果额外携带 `diagnostic`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingResult {
    pub score: u32,
    pub feedback: String,
    pub reasoning: String,
    pub satisfies_rubric: bool,
    pub diagnostic: Option<Diagnostic>,
}

impl GradingResult {
    /// 正常评分结果，分数被截断到 `[0, max_points]`
    pub fn clamped(
        score: i64,
        max_points: u32,
        feedback: impl Into<String>,
        reasoning: impl Into<String>,
        satisfies_rubric: bool,
    ) -> Self {
        let score = score.clamp(0, i64::from(max_points)) as u32;
        Self {
            score,
            feedback: feedback.into(),
            reasoning: reasoning.into(),
            satisfies_rubric,
            diagnostic: None,
        }
    }

    /// 降级结果：零分，反馈中写明原因，提示人工复核
    pub fn degraded(diagnostic: Diagnostic) -> Self {
        Self {
            score: 0,
            feedback: format!("自动评分失败: {}。请人工复核。", diagnostic),
            reasoning: format!("degraded: {}", diagnostic.kind()),
            satisfies_rubric: false,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// 落库的评分记录
///
/// `ai_*` 字段由流水线写入；`final_*` 初始等于 AI 结果，之后可以被人工复核单独覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRow {
    pub submission_id: String,
    /// 学生提交中的题号
    pub question_no: String,
    pub max_points: u32,
    pub ai_score: u32,
    pub ai_feedback: String,
    pub ai_reasoning: String,
    pub ai_satisfies_rubric: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub final_score: u32,
    pub final_feedback: String,
    pub human_reviewed: bool,
}

impl GradeRow {
    pub fn from_result(
        submission_id: &str,
        question_no: &str,
        max_points: u32,
        result: &GradingResult,
    ) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            question_no: question_no.to_string(),
            max_points,
            ai_score: result.score,
            ai_feedback: result.feedback.clone(),
            ai_reasoning: result.reasoning.clone(),
            ai_satisfies_rubric: result.satisfies_rubric,
            diagnostic: result.diagnostic.as_ref().map(|d| d.kind().to_string()),
            final_score: result.score,
            final_feedback: result.feedback.clone(),
            human_reviewed: false,
        }
    }
}
