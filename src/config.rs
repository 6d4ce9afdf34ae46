use crate::error::ConfigError;

/// 文档解析策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStrategyKind {
    /// 由评分模型抽取题目树
    Oracle,
    /// 基于标题 / 小题标记的启发式切分
    Heuristic,
}

impl std::str::FromStr for ParseStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" | "llm" => Ok(ParseStrategyKind::Oracle),
            "heuristic" => Ok(ParseStrategyKind::Heuristic),
            other => Err(format!("未知的解析策略: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时评分的提交数量
    pub max_concurrent_submissions: usize,
    /// 单份提交内同时评分的题目数量
    pub max_concurrent_questions: usize,
    /// 单次评分运行的整体超时（秒）
    pub run_timeout_secs: u64,
    /// 评分任务 TOML 文件目录
    pub job_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 文档解析策略
    pub parse_strategy: ParseStrategyKind,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 单次调用超时（秒）
    pub llm_timeout_secs: u64,
    /// 结构不合法时的最大尝试次数
    pub llm_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 4,
            max_concurrent_questions: 4,
            run_timeout_secs: 300,
            job_folder: "grading_jobs".to_string(),
            verbose_logging: false,
            output_log_file: "grading_output.txt".to_string(),
            parse_strategy: ParseStrategyKind::Heuristic,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.1,
            llm_max_tokens: 500,
            llm_timeout_secs: 30,
            llm_max_attempts: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_submissions: env_parse("MAX_CONCURRENT_SUBMISSIONS").unwrap_or(default.max_concurrent_submissions),
            max_concurrent_questions: env_parse("MAX_CONCURRENT_QUESTIONS").unwrap_or(default.max_concurrent_questions),
            run_timeout_secs: env_parse("RUN_TIMEOUT_SECS").unwrap_or(default.run_timeout_secs),
            job_folder: std::env::var("JOB_FOLDER").unwrap_or(default.job_folder),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            parse_strategy: env_parse("PARSE_STRATEGY").unwrap_or(default.parse_strategy),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(default.llm_max_tokens),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(default.llm_timeout_secs),
            llm_max_attempts: env_parse("LLM_MAX_ATTEMPTS").unwrap_or(default.llm_max_attempts),
        }
    }

    /// 是否存在可用的评分模型配置
    pub fn has_oracle(&self) -> bool {
        !self.llm_api_key.trim().is_empty()
    }
}

/// 读取并解析环境变量；未设置时返回 None，解析失败时记录警告并返回 None
fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match parse_value(var_name, &value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("{}，使用默认值", e);
            None
        }
    }
}

fn parse_value<T: std::str::FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: std::any::type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_oracle() {
        let config = Config::default();
        assert!(!config.has_oracle());
        assert_eq!(config.llm_max_attempts, 3);
        assert_eq!(config.parse_strategy, ParseStrategyKind::Heuristic);
    }

    #[test]
    fn test_parse_strategy_from_str() {
        assert_eq!("oracle".parse::<ParseStrategyKind>(), Ok(ParseStrategyKind::Oracle));
        assert_eq!(" Heuristic ".parse::<ParseStrategyKind>(), Ok(ParseStrategyKind::Heuristic));
        assert!("magic".parse::<ParseStrategyKind>().is_err());
    }

    #[test]
    fn test_parse_value_reports_variable() {
        assert_eq!(parse_value::<u32>("LLM_MAX_TOKENS", " 800 ").unwrap(), 800);
        let err = parse_value::<u64>("RUN_TIMEOUT_SECS", "soon").unwrap_err();
        assert!(err.to_string().contains("RUN_TIMEOUT_SECS"));
        assert!(err.to_string().contains("soon"));
    }
}
