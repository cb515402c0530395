//! 条件表达式操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// 从关键字解析（区分大小写）
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// 与布尔字面量比较的操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Neq,
}

impl Comparison {
    /// 比较结果是否等价于取反
    ///
    /// `x == true`、`x != false` 等价于 `x`；`x == false`、`x != true` 等价于 `not x`。
    pub fn negates(self, literal: bool) -> bool {
        match self {
            Self::Eq => !literal,
            Self::Neq => literal,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Neq => write!(f, "!="),
        }
    }
}

/// 取反关键字
pub const NOT: &str = "not";
