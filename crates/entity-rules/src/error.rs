//! 规则引擎错误类型

use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    // ==================== 结构校验错误 ====================
    #[error("规则列表为空")]
    EmptyRules,

    #[error("规则缺少名称: 第 {index} 条规则")]
    EmptyRuleName { index: usize },

    #[error("规则 {rule} 缺少 when，如不需要触发条件请设置为 [\"true\"]")]
    EmptyRuleWhen { rule: String },

    #[error("规则 {rule} 缺少 if，如不需要判断条件请设置为 \"true\"")]
    EmptyRuleIf { rule: String },

    #[error("规则 {rule} 缺少 do")]
    EmptyRuleDo { rule: String },

    #[error("方法绑定名称不能为空: method={method}")]
    EmptyMethodExecutionName { method: String },

    #[error("方法绑定 {name} 的 method 不能为空")]
    EmptyMethodExecutionMethod { name: String },

    // ==================== 调度错误 ====================
    #[error("未注册: {0}")]
    MethodNotRegistered(String),

    #[error("未返回布尔值: {0}")]
    MethodReturnNotBool(String),

    #[error("调用 {name} 失败: {source}")]
    Invocation {
        name: String,
        #[source]
        source: InvokeFault,
    },

    // ==================== 表达式错误 ====================
    #[error("条件表达式解析失败 '{expression}': {message}")]
    ExpressionParse { expression: String, message: String },

    // ==================== 规则阶段包装 ====================
    #[error("规则 {rule} 触发检查失败: {source}")]
    Trigger {
        rule: String,
        #[source]
        source: Box<RuleError>,
    },

    #[error("规则 {rule} 条件检查失败: {source}")]
    Condition {
        rule: String,
        #[source]
        source: Box<RuleError>,
    },

    #[error("规则 {rule} 动作执行失败: {source}")]
    Action {
        rule: String,
        #[source]
        source: Box<RuleError>,
    },

    // ==================== 加载错误 ====================
    #[error("读取规则文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML 解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("规则文档缺少 {0} 节点")]
    MissingSection(String),

    #[error("不支持的规则文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("方法绑定 {binding} 的参数模板无效: {source}")]
    TemplateParse {
        binding: String,
        #[source]
        source: TemplateError,
    },
}

impl RuleError {
    /// 剥离阶段包装，返回最内层的错误
    pub fn root_cause(&self) -> &RuleError {
        match self {
            Self::Trigger { source, .. }
            | Self::Condition { source, .. }
            | Self::Action { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// 方法调用过程中的故障
#[derive(Debug, Error)]
pub enum InvokeFault {
    #[error("实体类型未提供方法 {0}")]
    MethodNotFound(String),

    #[error("参数数量不匹配: 期望 {expected}, 实际 {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("第 {index} 个参数类型不匹配: {message}")]
    ArgumentType { index: usize, message: String },

    #[error("方法返回错误: {0}")]
    Failed(String),

    #[error("方法执行时 panic: {0}")]
    Panicked(String),

    #[error("参数渲染失败: {0}")]
    Render(#[from] TemplateError),
}

pub type Result<T> = std::result::Result<T, RuleError>;
