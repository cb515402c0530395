//! 条件表达式编译器
//!
//! 将 if 子句（如 `has_label and not (has_assignee or is_draft)`）解析为内存中的执行树，
//! 并预先提取表达式中引用的全部谓词名。

use crate::error::{Result, RuleError};
use crate::operators::{Comparison, LogicalOperator, NOT};
use std::fmt;

/// 条件树节点
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    /// 通过条件注册表调用的谓词
    Predicate(String),
    Literal(bool),
    Not(Box<ConditionNode>),
    Group(LogicalGroup),
}

impl ConditionNode {
    pub fn predicate(name: impl Into<String>) -> Self {
        Self::Predicate(name.into())
    }

    pub fn negate(node: ConditionNode) -> Self {
        Self::Not(Box::new(node))
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(name) => write!(f, "{}", name),
            Self::Literal(value) => write!(f, "{}", value),
            Self::Not(inner) => write!(f, "not {}", inner),
            Self::Group(group) => {
                write!(f, "(")?;
                for (i, child) in group.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", group.operator)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// 逻辑组节点
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalGroup {
    pub operator: LogicalOperator,
    pub children: Vec<ConditionNode>,
}

impl LogicalGroup {
    pub fn new(operator: LogicalOperator, children: Vec<ConditionNode>) -> Self {
        Self { operator, children }
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, children)
    }
}

/// 编译后的条件
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    /// 原始表达式
    pub source: String,
    pub root: ConditionNode,
    /// 表达式中引用的谓词（去重，按首次出现顺序）
    pub predicates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Bool(bool),
    Logical(LogicalOperator),
    Not,
    Cmp(Comparison),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "{}", name),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Logical(op) => write!(f, "{}", op),
            Self::Not => write!(f, "{}", NOT),
            Self::Cmp(cmp) => write!(f, "{}", cmp),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
        }
    }
}

/// 条件表达式编译器
#[derive(Debug, Default)]
pub struct ConditionCompiler;

impl ConditionCompiler {
    pub fn new() -> Self {
        Self
    }

    /// 编译条件表达式
    pub fn compile(&self, expression: &str) -> Result<CompiledCondition> {
        let tokens = tokenize(expression).map_err(|message| parse_error(expression, message))?;
        if tokens.is_empty() {
            return Err(parse_error(expression, "表达式为空".to_string()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser
            .parse_or()
            .map_err(|message| parse_error(expression, message))?;

        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(parse_error(
                expression,
                format!("位置 {}: 多余的标记 '{}'", offset, token),
            ));
        }

        let predicates = self.extract_predicates(&root);

        Ok(CompiledCondition {
            source: expression.to_string(),
            root,
            predicates,
        })
    }

    /// 提取所有谓词名（去重，保持首次出现顺序）
    fn extract_predicates(&self, node: &ConditionNode) -> Vec<String> {
        let mut predicates = Vec::new();
        self.collect_predicates(node, &mut predicates);
        predicates
    }

    fn collect_predicates(&self, node: &ConditionNode, predicates: &mut Vec<String>) {
        match node {
            ConditionNode::Predicate(name) => {
                if !predicates.contains(name) {
                    predicates.push(name.clone());
                }
            }
            ConditionNode::Literal(_) => {}
            ConditionNode::Not(inner) => self.collect_predicates(inner, predicates),
            ConditionNode::Group(group) => {
                for child in &group.children {
                    self.collect_predicates(child, predicates);
                }
            }
        }
    }
}

fn parse_error(expression: &str, message: String) -> RuleError {
    RuleError::ExpressionParse {
        expression: expression.to_string(),
        message,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// 词法分析，返回 (字节偏移, 标记) 列表
fn tokenize(expression: &str) -> std::result::Result<Vec<(usize, Token)>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push((offset, Token::LParen)),
            ')' => tokens.push((offset, Token::RParen)),
            '=' | '!' => {
                if chars.next_if(|(_, next)| *next == '=').is_none() {
                    return Err(format!("位置 {}: 期望 '{}='", offset, c));
                }
                let cmp = if c == '=' {
                    Comparison::Eq
                } else {
                    Comparison::Neq
                };
                tokens.push((offset, Token::Cmp(cmp)));
            }
            c if is_word_char(c) => {
                let mut end = offset + c.len_utf8();
                while let Some((next_offset, next)) = chars.next_if(|(_, n)| is_word_char(*n)) {
                    end = next_offset + next.len_utf8();
                }
                let word = &expression[offset..end];
                let token = match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    NOT => Token::Not,
                    _ => match LogicalOperator::from_keyword(word) {
                        Some(op) => Token::Logical(op),
                        None => Token::Ident(word.to_string()),
                    },
                };
                tokens.push((offset, token));
            }
            other => return Err(format!("位置 {}: 无法识别的字符 '{}'", offset, other)),
        }
    }

    Ok(tokens)
}

/// `not` 与括号的最大嵌套层数
pub const MAX_NESTING_DEPTH: usize = 256;

/// 递归下降解析器
///
/// 优先级从低到高：or、and、not、比较、括号/操作数。
struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    /// 当前 `not` 与括号的嵌套层数
    depth: usize,
}

type ParseResult = std::result::Result<ConditionNode, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self, offset: usize) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(format!(
                "位置 {}: 嵌套过深，最多 {} 层",
                offset, MAX_NESTING_DEPTH
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> ParseResult {
        self.parse_chain(LogicalOperator::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult {
        self.parse_chain(LogicalOperator::And, Self::parse_unary)
    }

    /// 解析同一操作符连接的操作数，多于一个时合并为逻辑组
    fn parse_chain(
        &mut self,
        operator: LogicalOperator,
        operand: fn(&mut Self) -> ParseResult,
    ) -> ParseResult {
        let mut children = vec![operand(self)?];
        while self.peek() == Some(&Token::Logical(operator)) {
            self.pos += 1;
            children.push(operand(self)?);
        }

        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(ConditionNode::Group(LogicalGroup::new(operator, children)))
        }
    }

    fn parse_unary(&mut self) -> ParseResult {
        if let Some((offset, Token::Not)) = self.tokens.get(self.pos) {
            let offset = *offset;
            self.pos += 1;
            self.enter(offset)?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(ConditionNode::negate(inner));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult {
        let node = self.parse_primary()?;
        // 连续比较只翻转奇偶，不叠加节点
        let mut negated = false;

        while let Some(Token::Cmp(cmp)) = self.peek() {
            let cmp = *cmp;
            self.pos += 1;
            match self.next() {
                Some((_, Token::Bool(literal))) => {
                    if cmp.negates(literal) {
                        negated = !negated;
                    }
                }
                Some((offset, token)) => {
                    return Err(format!(
                        "位置 {}: '{}' 之后期望 true 或 false，实际 '{}'",
                        offset, cmp, token
                    ));
                }
                None => {
                    return Err(format!("'{}' 之后期望 true 或 false，但表达式已结束", cmp));
                }
            }
        }

        if negated {
            Ok(ConditionNode::negate(node))
        } else {
            Ok(node)
        }
    }

    fn parse_primary(&mut self) -> ParseResult {
        match self.next() {
            Some((_, Token::Ident(name))) => Ok(ConditionNode::Predicate(name)),
            Some((_, Token::Bool(value))) => Ok(ConditionNode::Literal(value)),
            Some((offset, Token::LParen)) => {
                self.enter(offset)?;
                let inner = self.parse_or()?;
                self.leave();
                match self.next() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((found, token)) => Err(format!(
                        "位置 {}: 期望 ')' 以闭合位置 {} 的 '('，实际 '{}'",
                        found, offset, token
                    )),
                    None => Err(format!("位置 {} 的 '(' 未闭合", offset)),
                }
            }
            Some((offset, token)) => {
                Err(format!("位置 {}: 期望操作数，实际 '{}'", offset, token))
            }
            None => Err("期望操作数，但表达式已结束".to_string()),
        }
    }
}
