//! 参数模板数据模型
//!
//! 定义已解析的参数模板结构、模板函数表以及渲染时使用的实体视图。

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 模板错误
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("模板语法错误: {0}")]
    Syntax(String),

    #[error("未定义的函数: {0}")]
    UnknownFunction(String),

    #[error("字段不存在: {0}")]
    FieldNotFound(String),

    #[error("函数 {name} 调用失败: {message}")]
    Function { name: String, message: String },

    #[error("实体序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 模板中可调用的自由函数
pub type TemplateFunc = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// 模板函数表
#[derive(Clone, Default)]
pub struct FuncMap {
    funcs: HashMap<String, TemplateFunc>,
}

impl FuncMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册函数，同名函数会被覆盖
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.funcs.insert(name.into(), Arc::new(func));
        self
    }

    /// 合并另一张函数表，冲突时以 other 为准
    pub fn merge(&mut self, other: &FuncMap) {
        for (name, func) in &other.funcs {
            self.funcs.insert(name.clone(), Arc::clone(func));
        }
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFunc> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl fmt::Debug for FuncMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("FuncMap").field("funcs", &names).finish()
    }
}

/// 已在解析期确定的函数引用
#[derive(Clone)]
pub enum FuncRef {
    /// 调用方提供的自由函数
    Free { name: String, func: TemplateFunc },
    /// 实体方法，渲染时在当前实体上调用
    Entity { name: String },
}

impl FuncRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Free { name, .. } | Self::Entity { name } => name,
        }
    }
}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free { name, .. } => write!(f, "Free({})", name),
            Self::Entity { name } => write!(f, "Entity({})", name),
        }
    }
}

/// 操作数
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`，实体本身
    Dot,
    /// `.a.b.0`，实体字段路径
    Field(Vec<String>),
    Literal(Value),
}

impl Operand {
    pub fn field_path(path: &[String]) -> String {
        format!(".{}", path.join("."))
    }
}

/// 模板动作（`{{ ... }}` 内的内容）
#[derive(Debug, Clone)]
pub enum Pipeline {
    Operand(Operand),
    Call { func: FuncRef, args: Vec<Operand> },
}

/// 模板片段
#[derive(Debug, Clone)]
pub enum TemplatePart {
    Static(String),
    Action(Pipeline),
}

/// 已解析的参数模板
#[derive(Debug, Clone)]
pub struct ArgTemplate {
    pub(crate) source: String,
    pub(crate) parts: Vec<TemplatePart>,
}

impl ArgTemplate {
    /// 原始模板文本
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// 字符串中是否含有模板动作
    pub fn is_template(s: &str) -> bool {
        s.contains("{{")
    }
}

/// 渲染时的实体视图（实体序列化后的 JSON 快照）
#[derive(Debug, Clone, Default)]
pub struct EntityView {
    data: Value,
}

impl EntityView {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    pub fn from_entity<T: Serialize + ?Sized>(entity: &T) -> Result<Self, TemplateError> {
        Ok(Self {
            data: serde_json::to_value(entity)?,
        })
    }

    /// 按路径获取字段值，支持数组索引（如 `labels.0`）
    pub fn get_field<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = &self.data;

        for part in path {
            let part = part.as_ref();
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}
