//! 题号匹配服务
//!
//! 学生写的题号（"q3.1b"、"3.2.b"、"Question 3"）往往和教师的标准题号不一致。
//! 这里按固定顺序尝试一串匹配策略，第一个命中的策略给出标准题号。

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]*)[ \t]*0*(\d+)(.*)$").expect("题号正则"));

/// 单个匹配策略：(提交题号, 候选标准题号) → 命中的标准题号
pub type MatchStrategy = fn(&str, &[String]) -> Option<String>;

/// 题号匹配服务
pub struct IdentifierReconciler {
    strategies: Vec<(&'static str, MatchStrategy)>,
}

impl Default for IdentifierReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierReconciler {
    /// 标准策略链：精确 → 前缀截断 → 前导整数 → 唯一候选
    pub fn new() -> Self {
        Self {
            strategies: vec![
                ("exact", exact_match),
                ("prefix", prefix_truncation),
                ("leading_integer", leading_integer_match),
                ("sole_candidate", sole_candidate),
            ],
        }
    }

    /// 自定义策略链
    pub fn with_strategies(strategies: Vec<(&'static str, MatchStrategy)>) -> Self {
        Self { strategies }
    }

    /// 把提交题号映射到标准题号；所有策略都未命中时返回 None
    pub fn reconcile(&self, id: &str, candidates: &[String]) -> Option<String> {
        let id = id.trim();
        self.strategies.iter().find_map(|(name, strategy)| {
            let hit = strategy(id, candidates)?;
            debug!("题号 {} 通过 {} 策略匹配到 {}", id, name, hit);
            Some(hit)
        })
    }
}

/// 精确匹配
pub fn exact_match(id: &str, candidates: &[String]) -> Option<String> {
    candidates.iter().find(|c| c.as_str() == id).cloned()
}

/// 按层级分隔符逐级截断，从长到短尝试
pub fn prefix_truncation(id: &str, candidates: &[String]) -> Option<String> {
    let parts: Vec<&str> = id.split('.').collect();
    (1..parts.len())
        .rev()
        .map(|len| parts[..len].join("."))
        .find_map(|prefix| exact_match(&prefix, candidates))
}

/// 提取前导整数（"q3.1b" → 3），匹配只由 字母前缀 + 同一整数 组成的候选
///
/// 多个候选都符合时，优先字母前缀（忽略大小写）相同的那个。
pub fn leading_integer_match(id: &str, candidates: &[String]) -> Option<String> {
    let (prefix, number, _) = leading_integer(id)?;
    let bare: Vec<&String> = candidates
        .iter()
        .filter(|c| matches!(leading_integer(c), Some((_, n, rest)) if n == number && rest.is_empty()))
        .collect();
    bare.iter()
        .find(|c| leading_integer(c).is_some_and(|(p, _, _)| p == prefix))
        .or_else(|| bare.first())
        .map(|c| (*c).clone())
}

/// 只有一个候选时直接返回
pub fn sole_candidate(_id: &str, candidates: &[String]) -> Option<String> {
    match candidates {
        [only] => Some(only.clone()),
        _ => None,
    }
}

/// 拆出 (小写字母前缀, 整数, 剩余部分)
fn leading_integer(id: &str) -> Option<(String, String, String)> {
    let caps = LEADING_INTEGER.captures(id.trim())?;
    Some((
        caps[1].to_ascii_lowercase(),
        caps[2].to_string(),
        caps[3].to_string(),
    ))
}
