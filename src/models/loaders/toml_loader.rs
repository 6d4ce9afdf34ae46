use crate::error::FileError;
use crate::models::GradingJob;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载评分任务
pub async fn load_job_file(toml_file_path: &Path) -> Result<GradingJob> {
    let path = toml_file_path.display().to_string();
    if !toml_file_path.exists() {
        return Err(FileError::NotFound { path }.into());
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path.clone(),
            source,
        })?;

    let mut job: GradingJob =
        toml::from_str(&content).map_err(|source| FileError::TomlParseFailed { path, source })?;

    job.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(job)
}

/// 从文件夹中加载所有评分任务，单个文件失败只记录警告
pub async fn load_all_job_files(folder_path: &str) -> Result<Vec<GradingJob>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut jobs = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_job_file(&path).await {
            Ok(job) => {
                tracing::info!(
                    "作业 {} 共 {} 份提交",
                    job.assignment.id,
                    job.submissions.len()
                );
                jobs.push(job);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(jobs)
}
