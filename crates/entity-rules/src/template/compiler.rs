//! 模板编译器
//!
//! 将参数字符串解析为 [`ArgTemplate`]。模板由普通文本与 `{{ ... }}` 动作组成，
//! 动作可以是操作数（`.`、`.field.path`、字符串、数字、布尔、`nil`），
//! 也可以是函数调用（`func operand...`）。函数名在解析期解析为自由函数或实体方法。

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use super::models::{ArgTemplate, FuncMap, FuncRef, Operand, Pipeline, TemplateError, TemplatePart};

/// 模板编译器
pub struct TemplateCompiler {
    /// 匹配动作开头的 `{{` 及其后空白
    open_regex: Regex,
}

#[derive(Debug, Clone, PartialEq)]
enum Word {
    Ident(String),
    Operand(Operand),
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self {
            open_regex: Regex::new(r"\{\{\s*").expect("valid template regex"),
        }
    }

    /// 编译模板
    ///
    /// * `funcs` - 可用的自由函数
    /// * `entity_methods` - 可在模板中调用的实体方法名
    ///
    /// 同名时自由函数优先。
    pub fn compile(
        &self,
        source: &str,
        funcs: &FuncMap,
        entity_methods: &HashSet<String>,
    ) -> Result<ArgTemplate, TemplateError> {
        let mut parts = Vec::new();
        let mut last = 0;

        while let Some(open) = self.open_regex.find_at(source, last) {
            push_static(&mut parts, &source[last..open.start()]);

            let rest = &source[open.end()..];
            let close = find_action_end(rest).ok_or_else(|| {
                TemplateError::Syntax(format!("未闭合的 '{{{{': {}", &source[open.start()..]))
            })?;

            let pipeline = self.parse_pipeline(rest[..close].trim_end(), funcs, entity_methods)?;
            parts.push(TemplatePart::Action(pipeline));

            last = open.end() + close + 2;
        }
        push_static(&mut parts, &source[last..]);

        Ok(ArgTemplate {
            source: source.to_string(),
            parts,
        })
    }

    fn parse_pipeline(
        &self,
        body: &str,
        funcs: &FuncMap,
        entity_methods: &HashSet<String>,
    ) -> Result<Pipeline, TemplateError> {
        let mut words = tokenize(body)?.into_iter();

        let Some(head) = words.next() else {
            return Err(TemplateError::Syntax("空的模板动作 {{ }}".to_string()));
        };

        let mut args = Vec::new();
        for word in words {
            match word {
                Word::Operand(operand) => args.push(operand),
                Word::Ident(name) => {
                    return Err(TemplateError::Syntax(format!(
                        "'{}' 中不支持嵌套函数调用: {}",
                        body, name
                    )));
                }
            }
        }

        match head {
            Word::Ident(name) => {
                let func = if let Some(func) = funcs.get(&name) {
                    FuncRef::Free {
                        name,
                        func: func.clone(),
                    }
                } else if entity_methods.contains(&name) {
                    FuncRef::Entity { name }
                } else {
                    return Err(TemplateError::UnknownFunction(name));
                };
                Ok(Pipeline::Call { func, args })
            }
            Word::Operand(operand) => {
                if !args.is_empty() {
                    return Err(TemplateError::Syntax(format!(
                        "'{}' 以操作数开头但包含多个操作数",
                        body
                    )));
                }
                Ok(Pipeline::Operand(operand))
            }
        }
    }
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgTemplate {
    /// 解析不调用任何函数的模板
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        TemplateCompiler::new().compile(source, &FuncMap::default(), &HashSet::new())
    }
}

fn push_static(parts: &mut Vec<TemplatePart>, text: &str) {
    if !text.is_empty() {
        parts.push(TemplatePart::Static(text.to_string()));
    }
}

/// 返回动作结尾 `}}` 的字节偏移，双引号字符串内的 `}}` 不算结尾
fn find_action_end(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
            return Some(i);
        }
    }

    None
}

/// 将动作内容切分为单词，双引号字符串可包含空白与转义
fn tokenize(body: &str) -> Result<Vec<Word>, TemplateError> {
    let mut words = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut end = None;
            let mut escaped = false;
            for (offset, ch) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    end = Some(offset);
                    break;
                }
            }
            let end = end.ok_or_else(|| {
                TemplateError::Syntax(format!("未闭合的字符串: {}", &body[start..]))
            })?;
            let quoted = &body[start..=end];
            let literal: String = serde_json::from_str(quoted)
                .map_err(|e| TemplateError::Syntax(format!("无效的字符串 {}: {}", quoted, e)))?;
            words.push(Word::Operand(Operand::Literal(Value::String(literal))));
            continue;
        }

        let mut end = body.len();
        while let Some(&(offset, ch)) = chars.peek() {
            if ch.is_whitespace() {
                end = offset;
                break;
            }
            chars.next();
        }
        words.push(parse_word(&body[start..end])?);
    }

    Ok(words)
}

fn parse_word(word: &str) -> Result<Word, TemplateError> {
    if word == "." {
        return Ok(Word::Operand(Operand::Dot));
    }

    if let Some(path) = word.strip_prefix('.') {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TemplateError::Syntax(format!("无效的字段路径: {}", word)));
        }
        return Ok(Word::Operand(Operand::Field(segments)));
    }

    match word {
        "true" => return Ok(Word::Operand(Operand::Literal(Value::Bool(true)))),
        "false" => return Ok(Word::Operand(Operand::Literal(Value::Bool(false)))),
        "nil" => return Ok(Word::Operand(Operand::Literal(Value::Null))),
        _ => {}
    }

    if let Ok(n) = word.parse::<i64>() {
        return Ok(Word::Operand(Operand::Literal(Value::from(n))));
    }
    if let Ok(n) = word.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(n)
    {
        return Ok(Word::Operand(Operand::Literal(Value::Number(number))));
    }

    let mut chars = word.chars();
    let valid_ident = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    if valid_ident {
        Ok(Word::Ident(word.to_string()))
    } else {
        Err(TemplateError::Syntax(format!("无法识别的标记: {}", word)))
    }
}
