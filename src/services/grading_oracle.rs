//! 评分服务 - 业务能力层
//!
//! 只负责"给一道题打分"，不关心流程。
//!
//! 预言机的输出不可信：
//! - 返回结构不合法（字段缺失 / 类型不对）时重试，最多 `max_attempts` 次
//! - 传输失败（网络 / 鉴权 / 限流 / 超时）立即降级，不重试
//! - 分数无论返回什么都会被截断到 `[0, max_points]`
//!
//! 任何失败都降级为零分结果并附带诊断，`grade_question` 永不返回错误。

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{GradingOracle, OracleRequest};
use crate::error::{Diagnostic, OracleError};
use crate::models::{GradingResult, RubricEntry};
use crate::utils::truncate_text;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const GRADING_SYSTEM_MESSAGE: &str = "You are a helpful teaching assistant that grades student work fairly and consistently. Always respond with valid JSON.";

/// 预言机返回的评分结构
#[derive(Debug, Deserialize)]
struct GradingReply {
    score: f64,
    feedback: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    satisfies_rubric: bool,
}

/// 评分服务
pub struct GradingOracleAdapter {
    oracle: Option<Arc<dyn GradingOracle>>,
    max_attempts: u32,
}

impl GradingOracleAdapter {
    pub fn new(oracle: Option<Arc<dyn GradingOracle>>) -> Self {
        Self {
            oracle,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn is_available(&self) -> bool {
        self.oracle.is_some()
    }

    /// 给一道题打分
    ///
    /// # 参数
    /// - `question_text`: 题目
    /// - `student_answer`: 学生答案
    /// - `reference_answer`: 参考答案
    /// - `rubric`: 评分细则
    /// - `max_points`: 满分
    pub async fn grade_question(
        &self,
        question_text: &str,
        student_answer: &str,
        reference_answer: &str,
        rubric: &RubricEntry,
        max_points: u32,
    ) -> GradingResult {
        let Some(oracle) = self.oracle.as_deref() else {
            return GradingResult::degraded(Diagnostic::OracleUnavailable);
        };

        let request = build_grading_request(
            question_text,
            student_answer,
            reference_answer,
            rubric,
            max_points,
        );

        match request_structured(oracle, &request, self.max_attempts, |raw| {
            parse_grading_reply(raw, max_points)
        })
        .await
        {
            Ok(result) => result,
            Err(diagnostic) => {
                warn!(
                    "⚠️ 评分降级 ({}): {}",
                    truncate_text(question_text, 40),
                    diagnostic
                );
                GradingResult::degraded(diagnostic)
            }
        }
    }
}

/// 发送结构化请求并解析，结构不合法时重试
///
/// 评分和文档解析共用这一套重试规则。
pub(crate) async fn request_structured<T>(
    oracle: &dyn GradingOracle,
    request: &OracleRequest,
    max_attempts: u32,
    parse: impl Fn(&str) -> Result<T, OracleError>,
) -> Result<T, Diagnostic> {
    let mut last_violation = String::new();
    for attempt in 1..=max_attempts {
        let outcome = match oracle.complete(request).await {
            Ok(raw) => {
                debug!(
                    "第 {} 次调用 {} 返回: {}",
                    attempt,
                    oracle.model_name(),
                    truncate_text(&raw, 200)
                );
                parse(strip_code_fence(&raw))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!("第 {}/{} 次返回结构不合法: {}", attempt, max_attempts, e);
                last_violation = e.to_string();
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Diagnostic::OracleSchemaViolation {
        attempts: max_attempts,
        detail: last_violation,
    })
}

/// 去掉 ```json ... ``` 包裹
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记（```json）
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn parse_grading_reply(raw: &str, max_points: u32) -> Result<GradingResult, OracleError> {
    let reply: GradingReply = serde_json::from_str(raw)?;
    if !reply.score.is_finite() {
        return Err(OracleError::SchemaViolation(format!(
            "score 不是有效数字: {}",
            reply.score
        )));
    }
    Ok(GradingResult::clamped(
        reply.score.round() as i64,
        max_points,
        reply.feedback,
        reply.reasoning.unwrap_or_default(),
        reply.satisfies_rubric,
    ))
}

fn format_rubric(rubric: &RubricEntry, max_points: u32) -> String {
    let criteria = rubric.criteria.trim();
    if criteria.is_empty() {
        format!(
            "No specific rubric provided. Grade based on correctness and completeness (max {} points).",
            max_points
        )
    } else {
        format!("- ({} points) {}", max_points, criteria)
    }
}

/// 构建评分请求
fn build_grading_request(
    question_text: &str,
    student_answer: &str,
    reference_answer: &str,
    rubric: &RubricEntry,
    max_points: u32,
) -> OracleRequest {
    let user = format!(
        r#"You are an expert teaching assistant grading student homework. Grade the following student answer strictly according to the provided rubric and answer key.

QUESTION:
{question}

ANSWER KEY:
{reference}

STUDENT ANSWER:
{answer}

GRADING RUBRIC:
{rubric}

MAXIMUM POINTS: {max}

INSTRUCTIONS:
1. Compare the student answer to the answer key
2. Apply the grading criteria from the rubric
3. Provide an integer score from 0 to {max}
4. Set "satisfies_rubric" to true only if the answer fully satisfies the rubric
5. FEEDBACK POLICY: if the score equals {max} and the answer fully satisfies the rubric, "feedback" MUST be an empty string. Otherwise "feedback" MUST explain what is missing or wrong and how to correct it.

Respond with ONLY a valid JSON object in this exact format:
{{
    "score": <integer from 0 to {max}>,
    "feedback": "<corrective feedback, or empty string for a perfect answer>",
    "reasoning": "<brief explanation of how you arrived at this score>",
    "satisfies_rubric": <true or false>
}}

Do not include any text before or after the JSON object."#,
        question = question_text,
        reference = reference_answer,
        answer = student_answer,
        rubric = format_rubric(rubric, max_points),
        max = max_points,
    );

    OracleRequest {
        system: GRADING_SYSTEM_MESSAGE.to_string(),
        user,
    }
}
