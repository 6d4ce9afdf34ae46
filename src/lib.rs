//! # Auto Grader
//!
//! 一个用于作业自动评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有存储，只暴露 load / replace / update 能力
//! - `clients/` - 评分模型的传输层（`GradingOracle`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `DocumentSegmenter` - 把学生提交切成 (题号, 答案)
//! - `IdentifierReconciler` - 学生题号 → 标准题号
//! - `GradingOracleAdapter` - 单题评分，失败降级为零分
//! - `DocumentParsingService` - 作业 / 参考答案 / 评分细则文档 → 题目树
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份提交"的完整评分流程
//! - `GradingPipeline` - 流程编排（切分 → 加载作业 → 匹配 → 评分 → 保存）
//! - `apply_review` - 人工复核
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/dispatcher` - 异步派发、状态通道、超时兜底
//! - `orchestrator/batch_processor` - 批量评分任务

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, Diagnostic, PipelineError};
pub use infrastructure::{GradingStore, MemoryStore};
pub use models::{DocumentKind, DocumentTree, GradingResult, SubmissionStatus};
pub use orchestrator::{App, GradingDispatcher, PipelineStatus};
pub use services::{DocumentParsingService, DocumentSegmenter, GradingOracleAdapter, IdentifierReconciler};
pub use workflow::{GradingPipeline, PipelineSummary};
