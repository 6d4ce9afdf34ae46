//! 评分任务文件（TOML）对应的数据结构

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::RubricEntry;

/// 一个评分任务：一份作业 + 若干份学生提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJob {
    pub assignment: AssignmentSpec,
    #[serde(default)]
    pub submissions: Vec<SubmissionSpec>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

/// 作业定义
///
/// 参考答案与评分细则既可以直接写成映射，也可以给出原始文档交给解析服务。
/// 两者同时存在时以映射为准。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    #[serde(default)]
    pub answer_key: BTreeMap<String, String>,
    #[serde(default)]
    pub rubric: BTreeMap<String, RubricEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_key_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_document: Option<String>,
}

/// 学生提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSpec {
    pub id: String,
    pub content: String,
}
