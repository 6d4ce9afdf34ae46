//! 评分任务调度 - 编排层
//!
//! ## 职责
//!
//! 1. **异步派发**：每份提交的评分作为独立的 tokio 任务运行
//! 2. **并发控制**：使用 Semaphore 限制同时评分的提交数
//! 3. **状态通道**：每次运行分配一个 run id，通过 `watch` 通道发布状态和进度
//! 4. **超时兜底**：整体运行超时后强制把提交置为 ERROR
//!
//! 调用方不能对同一份提交同时派发两次运行。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::workflow::{GradingPipeline, PipelineSummary, ProgressReporter, Stage};

pub type RunId = u64;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// 一次运行的状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub submission_id: String,
    pub state: RunState,
    pub progress: u8,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineSummary>,
}

impl PipelineStatus {
    fn pending(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            state: RunState::Pending,
            progress: Stage::Queued.percent(),
            stage: Stage::Queued,
            diagnostic: None,
            result: None,
        }
    }
}

/// 把流水线进度转发到状态通道
struct WatchProgress {
    tx: Arc<watch::Sender<PipelineStatus>>,
}

impl ProgressReporter for WatchProgress {
    fn report(&self, _submission_id: &str, stage: Stage) {
        self.tx.send_modify(|status| {
            status.stage = stage;
            status.progress = stage.percent();
        });
    }
}

/// 评分任务调度器
pub struct GradingDispatcher {
    pipeline: Arc<GradingPipeline>,
    semaphore: Arc<Semaphore>,
    run_timeout: Duration,
    next_run_id: AtomicU64,
    runs: Mutex<HashMap<RunId, watch::Receiver<PipelineStatus>>>,
}

impl GradingDispatcher {
    pub fn new(pipeline: Arc<GradingPipeline>, max_concurrent: usize, run_timeout: Duration) -> Self {
        Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            run_timeout,
            next_run_id: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config, pipeline: Arc<GradingPipeline>) -> Self {
        Self::new(
            pipeline,
            config.max_concurrent_submissions,
            Duration::from_secs(config.run_timeout_secs),
        )
    }

    /// 派发一次评分运行，立即返回 run id
    pub async fn dispatch(&self, submission_id: &str) -> RunId {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(PipelineStatus::pending(submission_id));
        self.runs.lock().await.insert(run_id, rx);

        let pipeline = self.pipeline.clone();
        let semaphore = self.semaphore.clone();
        let run_timeout = self.run_timeout;
        let submission_id = submission_id.to_string();

        tokio::spawn(async move {
            let tx = Arc::new(tx);
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("[运行 {}] 调度器已关闭: {}", run_id, e);
                    tx.send_modify(|status| {
                        status.state = RunState::Failed;
                        status.diagnostic = Some(e.to_string());
                    });
                    return;
                }
            };

            tx.send_modify(|status| status.state = RunState::Running);
            info!("[运行 {}] 提交 {} 开始评分", run_id, submission_id);

            // 流水线在独立任务中运行，panic 只会体现为 JoinError
            let worker = tokio::spawn({
                let pipeline = pipeline.clone();
                let submission_id = submission_id.clone();
                let reporter = WatchProgress { tx: tx.clone() };
                async move {
                    tokio::time::timeout(run_timeout, pipeline.run(&submission_id, &reporter)).await
                }
            });

            let outcome = match worker.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => {
                    warn!(
                        "[运行 {}] ⏰ 提交 {} 超时 ({:?})，强制置为 ERROR",
                        run_id, submission_id, run_timeout
                    );
                    pipeline.mark_error(&submission_id).await;
                    Err(PipelineError::Timeout(run_timeout.as_secs()))
                }
                Err(e) => {
                    error!(
                        "[运行 {}] 💥 提交 {} 评分任务异常终止，强制置为 ERROR: {}",
                        run_id, submission_id, e
                    );
                    pipeline.mark_error(&submission_id).await;
                    Err(PipelineError::Aborted(e.to_string()))
                }
            };

            tx.send_modify(|status| match outcome {
                Ok(summary) => {
                    status.state = RunState::Succeeded;
                    status.result = Some(summary);
                }
                Err(e) => {
                    status.state = RunState::Failed;
                    status.diagnostic = Some(e.to_string());
                }
            });
        });

        run_id
    }

    /// 查询运行状态；run id 未知时返回 None
    pub async fn status(&self, run_id: RunId) -> Option<PipelineStatus> {
        let runs = self.runs.lock().await;
        runs.get(&run_id).map(|rx| rx.borrow().clone())
    }

    /// 等待运行结束并返回最终状态
    ///
    /// 返回后该运行记录被移除，之后再查询同一个 run id 得到 None。
    pub async fn wait(&self, run_id: RunId) -> Option<PipelineStatus> {
        let mut rx = self.runs.lock().await.get(&run_id)?.clone();
        let finished = rx
            .wait_for(|status| status.state.is_finished())
            .await
            .map(|status| status.clone());
        let last = match finished {
            Ok(status) => status,
            // 发送端已关闭，返回最后一次发布的状态
            Err(_) => rx.borrow().clone(),
        };
        self.runs.lock().await.remove(&run_id);
        Some(last)
    }

    /// 仍在登记中的运行数
    pub async fn tracked_runs(&self) -> usize {
        self.runs.lock().await.len()
    }
}
