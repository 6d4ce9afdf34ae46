//! 单题评分上下文
//!
//! 封装"我正在给哪份提交的哪道题打分"这一信息

use std::fmt::Display;

/// 单题评分上下文
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    pub submission_id: String,

    /// 学生提交中的题号
    pub question_no: String,

    /// 题目在提交中的序号（从1开始，仅用于日志显示）
    pub question_index: usize,
}

impl QuestionCtx {
    pub fn new(submission_id: impl Into<String>, question_no: impl Into<String>, question_index: usize) -> Self {
        Self {
            submission_id: submission_id.into(),
            question_no: question_no.into(),
            question_index,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[提交 #{} 第{}题 题号#{}]",
            self.submission_id, self.question_index, self.question_no
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ctx = QuestionCtx::new("s1", "2.a", 3);
        assert_eq!(ctx.to_string(), "[提交 #s1 第3题 题号#2.a]");
    }
}
