//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量评分任务的装配和统计。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、评分模型、存储、流水线、调度器
//! 2. **批量加载**：扫描并加载所有评分任务文件（`Vec<GradingJob>`）
//! 3. **作业装配**：参考答案 / 评分细则既可以是映射，也可以是交给解析服务的原始文档
//! 4. **派发等待**：每份提交交给调度器，等待全部结束
//! 5. **全局统计**：汇总评分结果并写入日志文件

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{GradingOracle, LlmClient};
use crate::config::Config;
use crate::error::{AppResult, FileError};
use crate::infrastructure::MemoryStore;
use crate::models::{
    load_all_job_files, sum_points, AssignmentRecord, AssignmentSpec, DocumentKind, DocumentTree, GradingJob,
    SubmissionRecord,
};
use crate::orchestrator::dispatcher::{GradingDispatcher, PipelineStatus, RunState};
use crate::services::{DocumentParsingService, GradingOracleAdapter};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::GradingPipeline;

/// 批量评分统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub graded: usize,
    pub failed: usize,
    pub total: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<MemoryStore>,
    parser: DocumentParsingService,
    dispatcher: GradingDispatcher,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;

        log_startup(config.max_concurrent_submissions, config.has_oracle());

        let oracle = LlmClient::from_config(&config).map(|c| Arc::new(c) as Arc<dyn GradingOracle>);
        Ok(Self::with_oracle(config, oracle))
    }

    /// 使用指定的评分模型装配应用
    pub fn with_oracle(config: Config, oracle: Option<Arc<dyn GradingOracle>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let grader = GradingOracleAdapter::new(oracle.clone()).with_max_attempts(config.llm_max_attempts);
        let parser = DocumentParsingService::from_config(&config, oracle);
        let pipeline = GradingPipeline::from_config(&config, store.clone(), grader);
        let dispatcher = GradingDispatcher::from_config(&config, Arc::new(pipeline));
        info!("📄 文档解析策略: {}", parser.strategy_name());

        Self {
            config,
            store,
            parser,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<BatchStats> {
        info!("\n📁 正在扫描评分任务...");
        let jobs = load_all_job_files(&self.config.job_folder).await?;

        if jobs.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(BatchStats::default());
        }

        let stats = self.grade_jobs(&jobs).await?;
        print_final_stats(stats.graded, stats.failed, stats.total, &self.config.output_log_file);
        Ok(stats)
    }

    /// 评分所有任务
    ///
    /// 提交在存储中以 `作业编号/提交编号` 为键，不同作业里的同名学生互不覆盖。
    /// 重复的作业编号或重复的提交只处理第一次出现，其余计为失败。
    pub async fn grade_jobs(&self, jobs: &[GradingJob]) -> Result<BatchStats> {
        let mut runs = Vec::new();
        let mut seen_assignments = HashSet::new();
        let mut seen_submissions = HashSet::new();
        let mut rejected = 0;
        for job in jobs {
            if !seen_assignments.insert(job.assignment.id.as_str()) {
                error!(
                    "❌ 作业 {} 重复出现，跳过其 {} 份提交",
                    job.assignment.id,
                    job.submissions.len()
                );
                rejected += job.submissions.len();
                continue;
            }

            let assignment = self.build_assignment(&job.assignment).await;
            info!(
                "📚 作业 {}: {} 道参考答案，{} 道评分细则，满分 {}",
                assignment.id,
                assignment.answer_key.flatten().len(),
                assignment.rubric.flatten().len(),
                assignment.max_points
            );
            self.store.insert_assignment(assignment).await;

            for submission in &job.submissions {
                let record_id = submission_key(&job.assignment.id, &submission.id);
                if !seen_submissions.insert(record_id.clone()) {
                    error!("[提交 {}] ❌ 同一作业内提交重复，跳过", record_id);
                    rejected += 1;
                    continue;
                }
                self.store
                    .insert_submission(SubmissionRecord::uploaded(
                        &record_id,
                        &job.assignment.id,
                        &submission.content,
                    ))
                    .await;
                let run_id = self.dispatcher.dispatch(&record_id).await;
                runs.push((record_id, run_id));
            }
        }

        let mut stats = BatchStats {
            failed: rejected,
            total: runs.len() + rejected,
            ..Default::default()
        };
        for (submission_id, run_id) in runs {
            match self.dispatcher.wait(run_id).await {
                Some(status) if status.state == RunState::Succeeded => {
                    stats.graded += 1;
                    self.append_result(&status)?;
                }
                Some(status) => {
                    stats.failed += 1;
                    error!(
                        "[提交 {}] ❌ 评分失败: {}",
                        submission_id,
                        status.diagnostic.as_deref().unwrap_or("未知错误")
                    );
                    self.append_result(&status)?;
                }
                None => {
                    stats.failed += 1;
                    error!("[提交 {}] 找不到运行记录 {}", submission_id, run_id);
                }
            }
        }
        Ok(stats)
    }

    /// 装配作业：映射优先，其次解析原始文档
    pub async fn build_assignment(&self, spec: &AssignmentSpec) -> AssignmentRecord {
        let answer_key = if !spec.answer_key.is_empty() {
            DocumentTree::from_answer_key(&spec.answer_key)
        } else if let Some(document) = &spec.answer_key_document {
            self.parser.parse_document(document, DocumentKind::AnswerKey).await
        } else {
            warn!("⚠️ 作业 {} 没有参考答案", spec.id);
            DocumentTree::empty(DocumentKind::AnswerKey)
        };

        let rubric = if !spec.rubric.is_empty() {
            DocumentTree::from_rubric(&spec.rubric)
        } else if let Some(document) = &spec.rubric_document {
            self.parser.parse_document(document, DocumentKind::Rubric).await
        } else {
            warn!("⚠️ 作业 {} 没有评分细则", spec.id);
            DocumentTree::empty(DocumentKind::Rubric)
        };

        let max_points = spec
            .max_points
            .unwrap_or_else(|| sum_points(rubric.questions.iter().map(|q| q.max_points)));

        AssignmentRecord {
            id: spec.id.clone(),
            answer_key,
            rubric,
            max_points,
        }
    }

    /// 把单份提交的结果追加到日志文件
    fn append_result(&self, status: &PipelineStatus) -> AppResult<()> {
        let line = match (&status.result, &status.diagnostic) {
            (Some(summary), _) => format!(
                "[{}] 提交 {} | 题目 {} | 总分 {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                status.submission_id,
                summary.questions_graded,
                summary.total_score
            ),
            (None, diagnostic) => format!(
                "[{}] 提交 {} | 失败 | {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                status.submission_id,
                diagnostic.as_deref().unwrap_or("未知错误")
            ),
        };

        let write_failed = |source| FileError::WriteFailed {
            path: self.config.output_log_file.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.output_log_file)
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).map_err(write_failed)?;
        Ok(())
    }
}

/// 存储中的提交编号
pub fn submission_key(assignment_id: &str, submission_id: &str) -> String {
    format!("{}/{}", assignment_id, submission_id)
}
