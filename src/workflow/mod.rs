//! 流程层（Workflow Layer）
//!
//! 定义"一份提交"的完整评分流程，以及评分之后的人工复核。

pub mod grading_flow;
pub mod progress;
pub mod question_ctx;
pub mod review;

pub use grading_flow::{GradingPipeline, PipelineSummary};
pub use progress::{LogProgress, ProgressReporter, Stage};
pub use question_ctx::QuestionCtx;
pub use review::{apply_review, ReviewUpdate};
