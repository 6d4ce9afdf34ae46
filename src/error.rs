use thiserror::Error;

use crate::models::SubmissionStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 评分流程错误
    #[error("评分流程错误: {0}")]
    Pipeline(#[from] PipelineError),
    /// 存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 评分预言机错误
    #[error("评分预言机错误: {0}")]
    Oracle(#[from] OracleError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 评分流程的致命错误
///
/// 只有这些错误会让提交进入 ERROR 状态，单题级别的问题都以 `Diagnostic` 形式降级。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 提交文档无法切分出任何可用内容
    #[error("文档结构解析失败: {0}")]
    StructuralParseFailure(String),
    /// 作业或提交记录不存在
    #[error("上游数据缺失: {0}")]
    UpstreamDataMissing(String),
    /// 存储读写失败
    #[error("存储操作失败: {0}")]
    Storage(String),
    /// 非法的状态迁移
    #[error("非法的状态迁移: {from} -> {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
    /// 整体运行超时
    #[error("评分运行超时 ({0} 秒)")]
    Timeout(u64),
    /// 评分任务异常终止（panic）
    #[error("评分任务异常终止: {0}")]
    Aborted(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => PipelineError::UpstreamDataMissing(err.to_string()),
            StoreError::Backend(msg) => PipelineError::Storage(msg),
        }
    }
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 记录不存在
    #[error("{entity} {id} 不存在")]
    NotFound { entity: &'static str, id: String },
    /// 后端错误
    #[error("存储后端错误: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn submission_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "提交",
            id: id.into(),
        }
    }

    pub fn assignment_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "作业",
            id: id.into(),
        }
    }

    pub fn grade_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "评分记录",
            id: id.into(),
        }
    }
}

/// 评分预言机（外部 LLM）调用错误
#[derive(Debug, Error)]
pub enum OracleError {
    /// 没有可用的预言机配置
    #[error("未配置可用的评分模型")]
    Unavailable,
    /// 返回内容不符合约定的结构（可重试）
    #[error("返回结构不合法: {0}")]
    SchemaViolation(String),
    /// 网络 / 鉴权 / 限流等传输失败（不重试）
    #[error("调用失败 (模型: {model}): {message}")]
    Transport { model: String, message: String },
    /// 单次调用超时（不重试）
    #[error("调用超时 (模型: {model}, {secs} 秒)")]
    Timeout { model: String, secs: u64 },
}

impl OracleError {
    /// 是否属于可重试的结构性错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::SchemaViolation(_))
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::SchemaViolation(err.to_string())
    }
}

/// 单题降级诊断
///
/// 附着在降级的 `GradingResult` 上，保证每道题都能落库一条记录。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("未配置评分模型，无法自动评分")]
    OracleUnavailable,
    #[error("评分模型连续 {attempts} 次返回不合法结构: {detail}")]
    OracleSchemaViolation { attempts: u32, detail: String },
    #[error("评分模型调用失败: {0}")]
    OracleTransportFailure(String),
    #[error("题号 {submitted} 无法匹配{missing}中的题目")]
    IdentifierMismatch {
        submitted: String,
        missing: &'static str,
    },
}

impl Diagnostic {
    /// 落库用的诊断类别
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::OracleUnavailable => "oracle_unavailable",
            Diagnostic::OracleSchemaViolation { .. } => "oracle_schema_violation",
            Diagnostic::OracleTransportFailure(_) => "oracle_transport_failure",
            Diagnostic::IdentifierMismatch { .. } => "identifier_mismatch",
        }
    }
}

impl From<OracleError> for Diagnostic {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable => Diagnostic::OracleUnavailable,
            OracleError::SchemaViolation(detail) => Diagnostic::OracleSchemaViolation {
                attempts: 1,
                detail,
            },
            other => Diagnostic::OracleTransportFailure(other.to_string()),
        }
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_upstream_missing() {
        let err: PipelineError = StoreError::assignment_not_found("hw1").into();
        assert!(matches!(err, PipelineError::UpstreamDataMissing(_)));
        assert!(err.to_string().contains("hw1"));
    }

    #[test]
    fn test_only_schema_violation_is_retryable() {
        assert!(OracleError::SchemaViolation("缺少 score".into()).is_retryable());
        assert!(!OracleError::Unavailable.is_retryable());
        assert!(!OracleError::Timeout {
            model: "m".into(),
            secs: 30
        }
        .is_retryable());
    }

    #[test]
    fn test_diagnostic_kind() {
        let diag = Diagnostic::IdentifierMismatch {
            submitted: "q9".into(),
            missing: "参考答案",
        };
        assert_eq!(diag.kind(), "identifier_mismatch");
        assert!(diag.to_string().contains("q9"));
    }
}
