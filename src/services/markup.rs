//! 标记文本 → 纯文本
//!
//! 只覆盖作业文档里常见的 LaTeX 写法：命令取其参数内容，环境标记换行，
//! 数学定界符丢弃，少量符号命令转成对应字符。括号不配对时报错，调用方退回原文。

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*(?:\n[ \t\r]*)+").expect("空行正则"));
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("空白正则"));

/// 转换失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("位置 {0} 处的右花括号没有对应的左花括号")]
    UnexpectedClose(usize),
    #[error("位置 {0} 处的左花括号没有闭合")]
    Unclosed(usize),
}

/// 参数内容被丢弃的命令
const DISCARD_ARGS: &[&str] = &[
    "label",
    "ref",
    "eqref",
    "cite",
    "vspace",
    "hspace",
    "includegraphics",
    "newpage",
    "clearpage",
    "pagebreak",
    "setlength",
    "bibliographystyle",
];

fn symbol(name: &str) -> Option<&'static str> {
    let s = match name {
        "ldots" | "dots" | "cdots" => "...",
        "times" => "×",
        "cdot" => "·",
        "leq" | "le" => "≤",
        "geq" | "ge" => "≥",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "infty" => "∞",
        "pm" => "±",
        "rightarrow" | "to" => "→",
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "theta" => "θ",
        "lambda" => "λ",
        "mu" => "μ",
        "pi" => "π",
        "sigma" => "σ",
        "quad" | "qquad" => " ",
        "LaTeX" => "LaTeX",
        "TeX" => "TeX",
        _ => return None,
    };
    Some(s)
}

/// 把 LaTeX 片段转换成纯文本
pub fn latex_to_text(input: &str) -> Result<String, MarkupError> {
    let mut converter = Converter {
        chars: input.chars().collect(),
        pos: 0,
    };
    converter.sequence(None)
}

/// 统一空白：连续空行合并为一个空行，连续水平空白合并为一个空格，去掉首尾空白
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// 转换并清理；转换失败时退回原始标记
pub fn to_plain_text(raw: &str) -> String {
    match latex_to_text(raw) {
        Ok(text) => normalize_whitespace(&text),
        Err(e) => {
            tracing::debug!("标记转换失败，保留原文: {}", e);
            normalize_whitespace(raw)
        }
    }
}

struct Converter {
    chars: Vec<char>,
    pos: usize,
}

impl Converter {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// 读取到文档结尾，或读取到 `open` 处开始的分组结束
    fn sequence(&mut self, open: Option<usize>) -> Result<String, MarkupError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '}' => {
                    return match open {
                        Some(_) => Ok(out),
                        None => Err(MarkupError::UnexpectedClose(self.pos - 1)),
                    }
                }
                '{' => {
                    let start = self.pos - 1;
                    out.push_str(&self.sequence(Some(start))?);
                }
                '\\' => self.command(&mut out)?,
                '%' => self.skip_comment(),
                '$' => {}
                '~' => out.push(' '),
                '&' => out.push(' '),
                other => out.push(other),
            }
        }
        match open {
            Some(start) => Err(MarkupError::Unclosed(start)),
            None => Ok(out),
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn command(&mut self, out: &mut String) -> Result<(), MarkupError> {
        let Some(c) = self.peek() else {
            return Ok(());
        };
        if !c.is_ascii_alphabetic() {
            self.pos += 1;
            match c {
                '\\' => out.push('\n'),
                '{' | '}' | '%' | '$' | '&' | '#' | '_' => out.push(c),
                _ => out.push(' '),
            }
            return Ok(());
        }

        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphabetic()) {
            name.push(c);
            self.pos += 1;
        }
        if self.peek() == Some('*') {
            self.pos += 1;
        }

        match name.as_str() {
            "begin" | "end" => {
                self.group_arg()?;
                out.push('\n');
            }
            "item" => {
                out.push_str("\n- ");
                if let Some(label) = self.optional_arg()? {
                    out.push_str(&label);
                    out.push(' ');
                }
            }
            "section" | "subsection" | "subsubsection" | "paragraph" => {
                self.optional_arg()?;
                if let Some(title) = self.group_arg()? {
                    out.push('\n');
                    out.push_str(&title);
                    out.push('\n');
                }
            }
            "frac" => {
                let num = self.group_arg()?.unwrap_or_default();
                let den = self.group_arg()?.unwrap_or_default();
                out.push_str(&format!("{}/{}", num, den));
            }
            "par" | "newline" | "linebreak" => out.push('\n'),
            name if DISCARD_ARGS.contains(&name) => {
                self.optional_arg()?;
                self.group_arg()?;
            }
            name => {
                if let Some(s) = symbol(name) {
                    out.push_str(s);
                    // 符号命令后的空格只起分隔作用
                    if self.peek() == Some(' ') {
                        out.push(' ');
                        self.pos += 1;
                    }
                } else {
                    self.optional_arg()?;
                    while let Some(arg) = self.group_arg()? {
                        out.push_str(&arg);
                    }
                }
            }
        }
        Ok(())
    }

    /// 紧跟在命令后的 `{...}` 参数
    fn group_arg(&mut self) -> Result<Option<String>, MarkupError> {
        if self.peek() != Some('{') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        self.sequence(Some(start)).map(Some)
    }

    /// 紧跟在命令后的 `[...]` 参数
    fn optional_arg(&mut self) -> Result<Option<String>, MarkupError> {
        if self.peek() != Some('[') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        let mut raw = String::new();
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                ']' if depth == 0 => return latex_to_text(&raw).map(Some),
                _ => {}
            }
            raw.push(c);
        }
        Err(MarkupError::Unclosed(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_keep_arguments() {
        let text = latex_to_text(r"The answer is \textbf{Paris} and \emph{not} Lyon.").unwrap();
        assert_eq!(text, "The answer is Paris and not Lyon.");
    }

    #[test]
    fn test_math_and_symbols() {
        let text = latex_to_text(r"$x \leq \frac{1}{2}$ and $\pi$").unwrap();
        assert_eq!(text, "x ≤ 1/2 and π");
    }

    #[test]
    fn test_environments_and_items() {
        let text = latex_to_text("\\begin{enumerate}\n\\item[(a)] first\n\\item second\n\\end{enumerate}").unwrap();
        let text = normalize_whitespace(&text);
        assert!(text.contains("- (a) first"));
        assert!(text.contains("- second"));
        assert!(!text.contains("enumerate"));
    }

    #[test]
    fn test_comments_and_escapes() {
        let text = latex_to_text("50\\% done % hidden\nnext").unwrap();
        assert_eq!(text, "50% done next");
    }

    #[test]
    fn test_discarded_commands() {
        let text = latex_to_text(r"See figure\label{fig:1}\vspace{2em} below").unwrap();
        assert_eq!(text, "See figure below");
    }

    #[test]
    fn test_unbalanced_braces() {
        assert_eq!(latex_to_text("a } b"), Err(MarkupError::UnexpectedClose(2)));
        assert_eq!(latex_to_text(r"\textbf{open"), Err(MarkupError::Unclosed(7)));
    }

    #[test]
    fn test_to_plain_text_falls_back_to_raw() {
        assert_eq!(to_plain_text("x  }  y"), "x } y");
    }

    #[test]
    fn test_normalize_whitespace() {
        let text = normalize_whitespace("  a \t  b\n\n\n   \nc  ");
        assert_eq!(text, "a b\n\nc");
    }
}
