//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务派发和批量处理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量评分处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载评分任务（Vec<GradingJob>）
//! - 装配作业的参考答案树和评分细则树
//! - 输出全局统计信息
//!
//! ### `dispatcher` - 评分任务调度器
//! - 每份提交一个 tokio 任务，Semaphore 控制并发
//! - 通过 watch 通道发布运行状态和进度
//! - 整体超时后强制置为 ERROR
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<GradingJob>)
//!     ↓
//! dispatcher (每份提交一次运行)
//!     ↓
//! workflow::GradingPipeline (处理单份提交)
//!     ↓
//! services (能力层：切分 / 题号匹配 / 评分 / 文档解析)
//!     ↓
//! infrastructure (基础设施：GradingStore)
//! ```

pub mod batch_processor;
pub mod dispatcher;

// 重新导出主要类型
pub use batch_processor::{submission_key, App, BatchStats};
pub use dispatcher::{GradingDispatcher, PipelineStatus, RunId, RunState};
