//! 文档解析服务 - 业务能力层
//!
//! 把作业 / 参考答案 / 评分细则文档解析成 `DocumentTree`。
//!
//! 两种可互换的策略，在构造时按配置选定：
//! - `OracleParser`：让评分模型一次性抽出完整题目树（含每个节点的分值）
//! - `HeuristicParser`：复用文档切分的标题识别，再用小题标记切出 (a)(b)…
//!
//! 两种策略都不会失败，出错时该文档降级为空树。

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::clients::{GradingOracle, OracleRequest};
use crate::config::{Config, ParseStrategyKind};
use crate::error::OracleError;
use crate::models::{sum_points, DocumentKind, DocumentTree, QuestionNode, MAX_NODE_POINTS};
use crate::services::grading_oracle::request_structured;
use crate::services::markup::to_plain_text;
use crate::services::segmenter::{split_by_markers, strip_preamble, top_level_spans};

/// 字母小题标记：`(a)`、`a)`、`\item[(a)]`
static LETTERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\\item[ \t]*\[)?\(?([a-z])\)\]?[ \t]*").expect("小题正则")
});
/// 显式分值标注："10 points"、"(5 pts)"
static POINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)[ \t]*(?:points?|pts?)\b").expect("分值正则"));

const PARENT_WITH_PARTS_POINTS: u32 = 20;
const QUESTION_POINTS: u32 = 10;
const SUBPART_POINTS: u32 = 5;

/// 解析策略
#[async_trait]
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse(&self, content: &str, kind: DocumentKind) -> DocumentTree;
}

/// 文档解析服务
pub struct DocumentParsingService {
    strategy: Box<dyn ParseStrategy>,
}

impl DocumentParsingService {
    pub fn new(strategy: Box<dyn ParseStrategy>) -> Self {
        Self { strategy }
    }

    /// 按配置选择策略；要求使用模型但没有可用模型时退回启发式
    pub fn from_config(config: &Config, oracle: Option<Arc<dyn GradingOracle>>) -> Self {
        let strategy: Box<dyn ParseStrategy> = match (config.parse_strategy, oracle) {
            (ParseStrategyKind::Oracle, Some(oracle)) => {
                Box::new(OracleParser::new(oracle).with_max_attempts(config.llm_max_attempts))
            }
            (ParseStrategyKind::Oracle, None) => {
                warn!("⚠️ 配置了模型解析但没有可用模型，改用启发式解析");
                Box::new(HeuristicParser)
            }
            (ParseStrategyKind::Heuristic, _) => Box::new(HeuristicParser),
        };
        Self::new(strategy)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// 解析一份文档
    pub async fn parse_document(&self, content: &str, kind: DocumentKind) -> DocumentTree {
        let tree = self.strategy.parse(content, kind).await;
        info!(
            "📄 {} 文档解析完成 ({}): {} 道顶层题目",
            kind,
            self.strategy.name(),
            tree.questions.len()
        );
        tree
    }
}

// ========== 启发式策略 ==========

/// 启发式解析
///
/// 分值规则：
/// - 评分细则文档读取 "N points" 标注
/// - 没有标注时：有小题的题目 20 分，没有小题 10 分，每个小题 5 分
/// - 题目本身没有标注但小题有标注时，取小题分值之和
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

impl HeuristicParser {
    fn explicit_points(text: &str, kind: DocumentKind) -> Option<u32> {
        if kind != DocumentKind::Rubric {
            return None;
        }
        POINTS
            .captures(text)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .map(|points| points.min(MAX_NODE_POINTS))
    }

    fn build_question(id: &str, heading: &str, raw: &str, kind: DocumentKind) -> QuestionNode {
        let Some(sub) = split_by_markers(raw, &LETTERED_ITEM, 2) else {
            let points = Self::explicit_points(heading, kind)
                .or_else(|| Self::explicit_points(raw, kind))
                .unwrap_or(QUESTION_POINTS);
            return QuestionNode::with_text(id, kind, to_plain_text(raw), points);
        };

        let mut any_explicit = false;
        let mut children: Vec<QuestionNode> = Vec::new();
        for (label, part) in sub.parts {
            let child_id = format!("{}.{}", id, label);
            if children.iter().any(|c| c.id == child_id) {
                continue;
            }
            let points = match Self::explicit_points(part, kind) {
                Some(points) => {
                    any_explicit = true;
                    points
                }
                None => SUBPART_POINTS,
            };
            children.push(QuestionNode::with_text(child_id, kind, to_plain_text(part), points));
        }

        let points = Self::explicit_points(heading, kind)
            .or_else(|| Self::explicit_points(sub.lead, kind))
            .unwrap_or_else(|| {
                if any_explicit {
                    sum_points(children.iter().map(|c| c.max_points))
                } else {
                    PARENT_WITH_PARTS_POINTS
                }
            });

        let mut node = QuestionNode::with_text(id, kind, to_plain_text(sub.lead), points);
        node.children = children;
        node
    }
}

#[async_trait]
impl ParseStrategy for HeuristicParser {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn parse(&self, content: &str, kind: DocumentKind) -> DocumentTree {
        let body = strip_preamble(content);
        let spans = top_level_spans(&body);

        if spans.is_empty() {
            if body.trim().is_empty() {
                return DocumentTree::empty(kind);
            }
            debug!("未识别到题目标题，整篇作为第 1 题");
            let question = Self::build_question("1", "", &body, kind);
            return DocumentTree::new(kind, vec![question]);
        }

        let mut questions: Vec<QuestionNode> = Vec::new();
        for span in &spans {
            let heading = &body[span.start..span.body_start];
            let raw = &body[span.body_start..span.end];
            let question = Self::build_question(&span.id, heading, raw, kind);
            merge_question(&mut questions, question, kind);
        }
        DocumentTree::new(kind, questions)
    }
}

/// 重复题号合并到已有节点，保证树内编号唯一
fn merge_question(questions: &mut Vec<QuestionNode>, question: QuestionNode, kind: DocumentKind) {
    let Some(existing) = questions.iter_mut().find(|q| q.id == question.id) else {
        questions.push(question);
        return;
    };
    debug!("题号 {} 重复出现，合并内容", question.id);
    let text = question.text(kind).to_string();
    let mut merged = QuestionNode::with_text(
        existing.id.clone(),
        kind,
        [existing.text(kind), text.as_str()]
            .iter()
            .filter(|t| !t.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n\n"),
        existing.max_points,
    );
    merged.children = std::mem::take(&mut existing.children);
    for child in question.children {
        if !merged.children.iter().any(|c| c.id == child.id) {
            merged.children.push(child);
        }
    }
    *existing = merged;
}

// ========== 模型辅助策略 ==========

#[derive(Debug, Deserialize)]
struct TreeReply {
    questions: Vec<NodeReply>,
}

#[derive(Debug, Deserialize)]
struct NodeReply {
    id: String,
    #[serde(default)]
    text: String,
    max_points: u32,
    #[serde(default)]
    parts: Vec<NodeReply>,
}

impl NodeReply {
    fn into_node(self, kind: DocumentKind) -> QuestionNode {
        let points = self.max_points.min(MAX_NODE_POINTS);
        let mut node = QuestionNode::with_text(self.id, kind, self.text, points);
        node.children = self.parts.into_iter().map(|p| p.into_node(kind)).collect();
        node
    }
}

/// 模型辅助解析
pub struct OracleParser {
    oracle: Arc<dyn GradingOracle>,
    max_attempts: u32,
}

impl OracleParser {
    pub fn new(oracle: Arc<dyn GradingOracle>) -> Self {
        Self {
            oracle,
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn build_request(content: &str, kind: DocumentKind) -> OracleRequest {
        let user = format!(
            r#"Extract the complete question hierarchy from the following {kind} document.

Return ONLY a valid JSON object in this exact format:
{{
    "questions": [
        {{
            "id": "<hierarchical identifier such as \"1\" or \"2.a\">",
            "text": "<the {role} of this node as plain text>",
            "max_points": <non-negative integer>,
            "parts": [ <nested nodes with the same shape> ]
        }}
    ]
}}

Rules:
1. Every node MUST carry an explicit integer "max_points".
2. Identifiers MUST be unique across the whole tree; sub-parts use "<parent>.<label>".
3. Keep the document order.

DOCUMENT:
{content}"#,
            kind = kind,
            role = kind.role_name(),
            content = content,
        );
        OracleRequest {
            system: "You convert homework documents into structured question trees. Always respond with valid JSON.".to_string(),
            user,
        }
    }

    fn parse_reply(raw: &str, kind: DocumentKind) -> Result<DocumentTree, OracleError> {
        let reply: TreeReply = serde_json::from_str(raw)?;
        let tree = DocumentTree::new(
            kind,
            reply.questions.into_iter().map(|q| q.into_node(kind)).collect(),
        );
        if !tree.has_unique_ids() {
            return Err(OracleError::SchemaViolation("题号重复".to_string()));
        }
        Ok(tree)
    }
}

#[async_trait]
impl ParseStrategy for OracleParser {
    fn name(&self) -> &'static str {
        "oracle"
    }

    async fn parse(&self, content: &str, kind: DocumentKind) -> DocumentTree {
        let request = Self::build_request(content, kind);
        match request_structured(self.oracle.as_ref(), &request, self.max_attempts, |raw| {
            Self::parse_reply(raw, kind)
        })
        .await
        {
            Ok(tree) => {
                for (id, points, sum) in tree.point_mismatches() {
                    warn!(
                        "⚠️ {} 题 {} 分值 {} 与小题之和 {} 不一致",
                        kind, id, points, sum
                    );
                }
                tree
            }
            Err(diagnostic) => {
                warn!("⚠️ {} 文档模型解析失败，返回空树: {}", kind, diagnostic);
                DocumentTree::empty(kind)
            }
        }
    }
}
