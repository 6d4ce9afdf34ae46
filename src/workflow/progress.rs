//! 评分进度
//!
//! 流水线每进入一个阶段就上报一次粗粒度进度（0/20/40/60/80/100）。

use serde::Serialize;
use std::fmt;
use tracing::debug;

/// 评分阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Segmenting,
    LoadingAssignment,
    Grading,
    SavingGrades,
    Done,
}

impl Stage {
    /// 阶段对应的进度百分比
    pub fn percent(&self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Segmenting => 20,
            Stage::LoadingAssignment => 40,
            Stage::Grading => 60,
            Stage::SavingGrades => 80,
            Stage::Done => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Queued => "排队中",
            Stage::Segmenting => "切分提交",
            Stage::LoadingAssignment => "加载作业",
            Stage::Grading => "逐题评分",
            Stage::SavingGrades => "保存评分",
            Stage::Done => "完成",
        };
        write!(f, "{} ({}%)", label, self.percent())
    }
}

/// 进度上报
pub trait ProgressReporter: Send + Sync {
    fn report(&self, submission_id: &str, stage: Stage);
}

/// 只写日志的进度上报
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, submission_id: &str, stage: Stage) {
        debug!("[提交 {}] {}", submission_id, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percent_is_monotonic() {
        let stages = [
            Stage::Queued,
            Stage::Segmenting,
            Stage::LoadingAssignment,
            Stage::Grading,
            Stage::SavingGrades,
            Stage::Done,
        ];
        let percents: Vec<u8> = stages.iter().map(Stage::percent).collect();
        assert_eq!(percents, vec![0, 20, 40, 60, 80, 100]);
        assert_eq!(Stage::Grading.to_string(), "逐题评分 (60%)");
    }
}
