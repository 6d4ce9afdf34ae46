//! 提交评分流程 - 流程层
//!
//! 核心职责：定义"一份提交"的完整评分流程
//!
//! 流程顺序：
//! 1. 状态 → PROCESSING
//! 2. 切分提交 → 保存答案映射
//! 3. 加载作业的参考答案树和评分细则树
//! 4. 逐题匹配题号 → 评分（匹配失败的题目直接降级为零分）
//! 5. 删除旧评分，写入新评分
//! 6. 汇总总分
//! 7. 状态 → GRADED
//!
//! 第 1 步之后的任何失败都会把提交置为 ERROR，不会停留在 PROCESSING。
//! 同一份提交的两次运行不能并发，由调度方保证。

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Diagnostic, PipelineError};
use crate::infrastructure::GradingStore;
use crate::models::{
    sum_points, AnswerMap, AssignmentRecord, GradeRow, GradingResult, QuestionNode, RubricEntry,
    SubmissionRecord, SubmissionStatus,
};
use crate::services::{DocumentSegmenter, GradingOracleAdapter, IdentifierReconciler};
use crate::utils::truncate_text;
use crate::workflow::progress::{ProgressReporter, Stage};
use crate::workflow::question_ctx::QuestionCtx;

/// 一次评分运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub total_score: u32,
    pub questions_graded: usize,
}

/// 提交评分流程
///
/// - 只依赖存储接口和业务能力（services）
/// - 单题失败只影响该题，不会中断整份提交
pub struct GradingPipeline {
    store: Arc<dyn GradingStore>,
    segmenter: DocumentSegmenter,
    reconciler: IdentifierReconciler,
    grader: GradingOracleAdapter,
    max_concurrent_questions: usize,
}

impl GradingPipeline {
    pub fn new(store: Arc<dyn GradingStore>, grader: GradingOracleAdapter) -> Self {
        Self {
            store,
            segmenter: DocumentSegmenter::new(),
            reconciler: IdentifierReconciler::new(),
            grader,
            max_concurrent_questions: 1,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn GradingStore>, grader: GradingOracleAdapter) -> Self {
        Self::new(store, grader).with_max_concurrent_questions(config.max_concurrent_questions)
    }

    /// 单份提交内同时评分的题目数
    pub fn with_max_concurrent_questions(mut self, n: usize) -> Self {
        self.max_concurrent_questions = n.max(1);
        self
    }

    /// 运行评分流程
    ///
    /// 可重入：再次运行会从头重新切分、重新评分，并完全覆盖上一次的评分记录。
    pub async fn run(
        &self,
        submission_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineSummary, PipelineError> {
        let submission = self.store.load_submission(submission_id).await?;
        let status = submission.status.transition(SubmissionStatus::Processing)?;
        self.store.update_status(submission_id, status).await?;
        info!("[提交 {}] ▶️ 开始评分", submission_id);

        match self.execute(&submission, progress).await {
            Ok(summary) => {
                info!(
                    "[提交 {}] ✅ 评分完成: {} 道题，总分 {}",
                    submission_id, summary.questions_graded, summary.total_score
                );
                Ok(summary)
            }
            Err(e) => {
                error!("[提交 {}] ❌ 评分失败: {}", submission_id, e);
                self.mark_error(submission_id).await;
                Err(e)
            }
        }
    }

    /// 把提交置为 ERROR；写入失败只记录日志
    pub async fn mark_error(&self, submission_id: &str) {
        if let Err(e) = self.store.update_status(submission_id, SubmissionStatus::Error).await {
            error!("[提交 {}] 无法写入 ERROR 状态: {}", submission_id, e);
        }
    }

    async fn execute(
        &self,
        submission: &SubmissionRecord,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineSummary, PipelineError> {
        let submission_id = submission.id.as_str();

        // ========== 切分 ==========
        progress.report(submission_id, Stage::Segmenting);
        let answers = self.segmenter.segment(&submission.content);
        if answers.iter().all(|(_, text)| text.trim().is_empty()) {
            return Err(PipelineError::StructuralParseFailure(format!(
                "提交 {} 没有可评分的内容",
                submission_id
            )));
        }
        info!("[提交 {}] 切分出 {} 道题", submission_id, answers.len());
        self.store.replace_answers(submission_id, answers.clone()).await?;

        // ========== 加载作业 ==========
        progress.report(submission_id, Stage::LoadingAssignment);
        let assignment = self.store.load_assignment(&submission.assignment_id).await?;

        // ========== 逐题评分 ==========
        progress.report(submission_id, Stage::Grading);
        let rows = self.grade_answers(submission_id, &answers, &assignment).await;

        // ========== 保存 ==========
        progress.report(submission_id, Stage::SavingGrades);
        let total_score = sum_points(rows.iter().map(|row| row.ai_score));
        let questions_graded = rows.len();
        self.store.replace_grades(submission_id, rows).await?;
        self.store.update_total_score(submission_id, total_score).await?;

        let status = SubmissionStatus::Processing.transition(SubmissionStatus::Graded)?;
        self.store.update_status(submission_id, status).await?;
        progress.report(submission_id, Stage::Done);

        Ok(PipelineSummary {
            total_score,
            questions_graded,
        })
    }

    /// 逐题评分，结果顺序与答案映射一致
    async fn grade_answers(
        &self,
        submission_id: &str,
        answers: &AnswerMap,
        assignment: &AssignmentRecord,
    ) -> Vec<GradeRow> {
        let answer_ids = assignment.answer_key.ids();
        let rubric_ids = assignment.rubric.ids();

        // 每个 future 持有自己的题号和答案，不借用答案映射
        let items: Vec<(QuestionCtx, String)> = answers
            .iter()
            .enumerate()
            .map(|(idx, (question_no, text))| {
                (QuestionCtx::new(submission_id, question_no, idx + 1), text.to_string())
            })
            .collect();
        let answer_ids = &answer_ids;
        let rubric_ids = &rubric_ids;

        stream::iter(items)
            .map(|(ctx, text)| async move {
                let (max_points, result) = self
                    .grade_one(&ctx, &text, assignment, answer_ids, rubric_ids)
                    .await;
                GradeRow::from_result(&ctx.submission_id, &ctx.question_no, max_points, &result)
            })
            .buffered(self.max_concurrent_questions)
            .collect()
            .await
    }

    /// 单题：两边题号都匹配上才调用评分模型，否则直接降级
    async fn grade_one(
        &self,
        ctx: &QuestionCtx,
        student_answer: &str,
        assignment: &AssignmentRecord,
        answer_ids: &[String],
        rubric_ids: &[String],
    ) -> (u32, GradingResult) {
        let key_node = self
            .reconciler
            .reconcile(&ctx.question_no, answer_ids)
            .and_then(|id| assignment.answer_key.find(&id));
        let rubric_node = self
            .reconciler
            .reconcile(&ctx.question_no, rubric_ids)
            .and_then(|id| assignment.rubric.find(&id));

        let (key_node, rubric_node) = match (key_node, rubric_node) {
            (Some(key), Some(rubric)) => (key, rubric),
            (key, rubric) => {
                let missing = if key.is_none() { "参考答案" } else { "评分细则" };
                warn!("{} ⚠️ 题号未能匹配{}，记零分", ctx, missing);
                let max_points = rubric.map_or(0, |node| node.max_points);
                let diagnostic = Diagnostic::IdentifierMismatch {
                    submitted: ctx.question_no.clone(),
                    missing,
                };
                return (max_points, GradingResult::degraded(diagnostic));
            }
        };

        let question_text = question_text(key_node, rubric_node);
        info!("{} 📝 评分中: {}", ctx, truncate_text(&question_text, 40));

        let max_points = rubric_node.max_points;
        let result = self
            .grader
            .grade_question(
                &question_text,
                student_answer,
                &key_node.answer_text,
                &RubricEntry::from(rubric_node),
                max_points,
            )
            .await;
        info!("{} 得分 {}/{}", ctx, result.score, max_points);
        (max_points, result)
    }
}

/// 题干：优先用树中的题目文本，没有时用标准题号代替
fn question_text(key_node: &QuestionNode, rubric_node: &QuestionNode) -> String {
    [&key_node.question_text, &rubric_node.question_text]
        .into_iter()
        .find(|text| !text.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| format!("Question {}", key_node.id))
}
