//! 文档切分服务 - 业务能力层
//!
//! 把半结构化的作业文档切成有序的 (题号, 文本) 片段。
//!
//! 切分顺序：
//! 1. 去掉文档前言（`\documentclass`、`\usepackage`、`\begin{document}` 等）
//! 2. 按题目标题切分：`\section{Question 3}`、`## Problem 2.1` ……
//! 3. 没有标题时依次尝试 `N. `、`QN:`、`Question N:`、`Problem N:`，都没有则整篇作为第 1 题
//! 4. 每道题内部再按小题标记 `(a)`、`a)`、`a.`、`N.`、`(N)` 切分（至少出现两次才算）
//! 5. 转成纯文本并统一空白
//!
//! 切分永远成功，最少返回一个 `"1"` 条目。

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::AnswerMap;
use crate::services::markup::to_plain_text;

static PREAMBLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\\(?:documentclass|usepackage|title|author|date|maketitle)\b.*(?:\r?\n|$)")
        .expect("前言正则")
});
static DOCUMENT_ENV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(?:begin|end)\{document\}").expect("文档环境正则"));

/// 题目标题：LaTeX 分节命令或 Markdown 标题
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)\\(?:sub)*section\*?[ \t]*\{[ \t]*(?:question|problem|q)[ \t]*(\d+(?:\.\d+)?)[^}]*\}|^[ \t]*#{1,6}[ \t]*(?:question|problem|q)[ \t]*(\d+(?:\.\d+)?)\b[^\n]*$",
    )
    .expect("标题正则")
});

/// 没有标题时的备选题号模式，按顺序尝试
static FALLBACK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^[ \t]*(\d+)\.[ \t]+",
        r"(?im)^[ \t]*Q(\d+)\b:?[ \t]*",
        r"(?im)^[ \t]*Question[ \t]+(\d+):?[ \t]*",
        r"(?im)^[ \t]*Problem[ \t]+(\d+):?[ \t]*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("备选题号正则"))
    .collect()
});

/// 小题标记，按优先级排列
static SUBPART_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^[ \t]*(?:\\item[ \t]*\[)?\(([a-z])\)\]?[ \t]*",
        r"(?m)^[ \t]*([a-z])\)[ \t]*",
        r"(?m)^[ \t]*([a-z])\.[ \t]+",
        r"(?m)^[ \t]*(\d+)\.[ \t]+",
        r"(?m)^[ \t]*\((\d+)\)[ \t]*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("小题正则"))
    .collect()
});

/// 一道顶层题目在文档中的位置
///
/// `start..body_start` 是标题本身，`body_start..end` 是题目内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub id: String,
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
}

/// 按标记切出的小题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subparts<'a> {
    /// 第一个小题标记之前的内容
    pub lead: &'a str,
    /// (小题标签, 原始内容)
    pub parts: Vec<(String, &'a str)>,
}

/// 文档切分服务
#[derive(Debug, Clone, Default)]
pub struct DocumentSegmenter;

impl DocumentSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// 切分文档，返回 题号 → 纯文本
    pub fn segment(&self, content: &str) -> AnswerMap {
        let body = strip_preamble(content);
        let spans = top_level_spans(&body);

        let mut answers = AnswerMap::new();
        if spans.is_empty() {
            debug!("未识别到任何题号，整篇作为第 1 题");
            answers.insert_or_append("1", to_plain_text(&body));
            return answers;
        }

        debug!("识别到 {} 个顶层题目", spans.len());
        for span in &spans {
            let raw = &body[span.body_start..span.end];
            match detect_subparts(raw) {
                Some(sub) => {
                    let lead = to_plain_text(sub.lead);
                    if !lead.is_empty() {
                        answers.insert_or_append(span.id.clone(), lead);
                    }
                    for (label, part) in sub.parts {
                        answers.insert_or_append(format!("{}.{}", span.id, label), to_plain_text(part));
                    }
                }
                None => answers.insert_or_append(span.id.clone(), to_plain_text(raw)),
            }
        }
        answers
    }
}

/// 去掉文档前言和 document 环境标记
pub fn strip_preamble(content: &str) -> String {
    let content = PREAMBLE_LINE.replace_all(content, "");
    let content = DOCUMENT_ENV.replace_all(&content, "");
    content.trim().to_string()
}

/// 顶层题目切分：先找标题，找不到再依次尝试备选模式
///
/// 返回的片段首尾相接，覆盖从第一个题号到文档结尾的全部内容。
pub fn top_level_spans(body: &str) -> Vec<Span> {
    let headings: Vec<(String, usize, usize)> = HEADING
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
            Some((id, whole.start(), whole.end()))
        })
        .collect();
    if !headings.is_empty() {
        return to_spans(headings, body.len());
    }

    for pattern in FALLBACK_PATTERNS.iter() {
        let matches: Vec<(String, usize, usize)> = pattern
            .captures_iter(body)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((caps[1].to_string(), whole.start(), whole.end()))
            })
            .collect();
        if !matches.is_empty() {
            debug!("使用备选题号模式: {}", pattern.as_str());
            return to_spans(matches, body.len());
        }
    }
    Vec::new()
}

fn to_spans(markers: Vec<(String, usize, usize)>, len: usize) -> Vec<Span> {
    let ends: Vec<usize> = markers
        .iter()
        .skip(1)
        .map(|(_, start, _)| *start)
        .chain(std::iter::once(len))
        .collect();
    markers
        .into_iter()
        .zip(ends)
        .map(|((id, start, body_start), end)| Span {
            id,
            start,
            body_start,
            end,
        })
        .collect()
}

/// 按优先级尝试小题模式，第一个出现至少两次的模式生效
pub fn detect_subparts(raw: &str) -> Option<Subparts<'_>> {
    SUBPART_PATTERNS
        .iter()
        .find_map(|pattern| split_by_markers(raw, pattern, 2))
}

/// 按给定标记切分；标记出现次数不足 `min_matches` 时返回 None
pub fn split_by_markers<'a>(raw: &'a str, pattern: &Regex, min_matches: usize) -> Option<Subparts<'a>> {
    let markers: Vec<(String, usize, usize)> = pattern
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((caps.get(1)?.as_str().to_string(), whole.start(), whole.end()))
        })
        .collect();
    if markers.len() < min_matches {
        return None;
    }

    let lead = &raw[..markers[0].1];
    let parts = to_spans(markers, raw.len())
        .into_iter()
        .map(|span| (span.id, &raw[span.body_start..span.end]))
        .collect();
    Some(Subparts { lead, parts })
}
