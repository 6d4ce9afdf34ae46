//! 题目树数据结构
//!
//! 作业、参考答案、评分细则三类文档都解析成同一棵 `DocumentTree`，
//! 只是填充的文本角色不同。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// 单个题目节点允许的最高分值，外部来源的分值超过时截断
pub const MAX_NODE_POINTS: u32 = 10_000;

/// 分值求和，溢出时饱和
pub fn sum_points(points: impl IntoIterator<Item = u32>) -> u32 {
    points.into_iter().fold(0, u32::saturating_add)
}

/// 文档类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// 作业题目
    Assignment,
    /// 参考答案
    AnswerKey,
    /// 评分细则
    Rubric,
}

impl DocumentKind {
    /// 该文档类型对应的文本角色名（用于提示词）
    pub fn role_name(&self) -> &'static str {
        match self {
            DocumentKind::Assignment => "question_text",
            DocumentKind::AnswerKey => "answer_text",
            DocumentKind::Rubric => "rubric_text",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Assignment => "assignment",
            DocumentKind::AnswerKey => "answer_key",
            DocumentKind::Rubric => "rubric",
        };
        write!(f, "{}", name)
    }
}

/// 题目节点
///
/// 三个文本字段永远存在，未填充的角色是空字符串。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionNode {
    /// 层级编号，例如 "3.2"
    pub id: String,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub rubric_text: String,
    #[serde(default)]
    pub max_points: u32,
    #[serde(default)]
    pub children: Vec<QuestionNode>,
}

impl QuestionNode {
    /// 按文档类型创建节点，只填充对应角色的文本
    pub fn with_text(
        id: impl Into<String>,
        kind: DocumentKind,
        text: impl Into<String>,
        max_points: u32,
    ) -> Self {
        let mut node = Self {
            id: id.into(),
            max_points,
            ..Default::default()
        };
        *node.text_mut(kind) = text.into();
        node
    }

    /// 读取指定角色的文本
    pub fn text(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Assignment => &self.question_text,
            DocumentKind::AnswerKey => &self.answer_text,
            DocumentKind::Rubric => &self.rubric_text,
        }
    }

    fn text_mut(&mut self, kind: DocumentKind) -> &mut String {
        match kind {
            DocumentKind::Assignment => &mut self.question_text,
            DocumentKind::AnswerKey => &mut self.answer_text,
            DocumentKind::Rubric => &mut self.rubric_text,
        }
    }

    pub fn push_child(mut self, child: QuestionNode) -> Self {
        self.children.push(child);
        self
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a QuestionNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// 一份文档解析后的题目树
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTree {
    pub kind: DocumentKind,
    #[serde(default)]
    pub questions: Vec<QuestionNode>,
}

impl DocumentTree {
    pub fn new(kind: DocumentKind, questions: Vec<QuestionNode>) -> Self {
        Self { kind, questions }
    }

    /// 空树（解析降级时使用）
    pub fn empty(kind: DocumentKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// 先序遍历所有节点
    pub fn flatten(&self) -> Vec<&QuestionNode> {
        let mut out = Vec::new();
        for question in &self.questions {
            question.walk(&mut out);
        }
        out
    }

    /// 所有节点编号（先序）
    pub fn ids(&self) -> Vec<String> {
        self.flatten().into_iter().map(|n| n.id.clone()).collect()
    }

    pub fn find(&self, id: &str) -> Option<&QuestionNode> {
        self.flatten().into_iter().find(|n| n.id == id)
    }

    /// 树内编号是否唯一
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.flatten().into_iter().all(|n| seen.insert(n.id.as_str()))
    }

    /// 父节点分值与子节点分值之和不一致的节点
    ///
    /// 返回 (编号, 父节点分值, 子节点之和)
    pub fn point_mismatches(&self) -> Vec<(String, u32, u32)> {
        self.flatten()
            .into_iter()
            .filter(|n| !n.children.is_empty())
            .filter_map(|n| {
                let sum = sum_points(n.children.iter().map(|c| c.max_points));
                (sum != n.max_points).then(|| (n.id.clone(), n.max_points, sum))
            })
            .collect()
    }

    /// 由 "编号 → 参考答案" 的扁平映射构建答案树
    pub fn from_answer_key(answers: &BTreeMap<String, String>) -> Self {
        let questions = answers
            .iter()
            .map(|(id, text)| QuestionNode::with_text(id.clone(), DocumentKind::AnswerKey, text.clone(), 0))
            .collect();
        Self::new(DocumentKind::AnswerKey, questions)
    }

    /// 由 "编号 → 评分条目" 的扁平映射构建评分细则树
    pub fn from_rubric(entries: &BTreeMap<String, RubricEntry>) -> Self {
        let questions = entries
            .iter()
            .map(|(id, entry)| {
                QuestionNode::with_text(
                    id.clone(),
                    DocumentKind::Rubric,
                    entry.criteria.clone(),
                    entry.max_points,
                )
            })
            .collect();
        Self::new(DocumentKind::Rubric, questions)
    }
}

/// 单题评分条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricEntry {
    pub max_points: u32,
    #[serde(default)]
    pub criteria: String,
}

impl From<&QuestionNode> for RubricEntry {
    fn from(node: &QuestionNode) -> Self {
        Self {
            max_points: node.max_points,
            criteria: node.rubric_text.clone(),
        }
    }
}

/// 学生提交的答案映射
///
/// 保持文档中的出现顺序，编号唯一。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMap {
    entries: Vec<(String, String)>,
}

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入答案；编号已存在时把文本追加到原条目之后
    pub fn insert_or_append(&mut self, id: impl Into<String>, text: impl Into<String>) {
        let id = id.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, existing)) => {
                if existing.is_empty() {
                    *existing = text;
                } else if !text.is_empty() {
                    existing.push_str("\n\n");
                    existing.push_str(&text);
                }
            }
            None => self.entries.push((id, text)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, text)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AnswerMap::new();
        for (id, text) in iter {
            map.insert_or_append(id, text);
        }
        map
    }
}
