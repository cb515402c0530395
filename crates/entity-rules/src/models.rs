//! 规则引擎领域模型

use crate::registry::Registry;
use crate::template::ArgTemplate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 表示“无条件”的哨兵值，用于 when 与 if
pub const ALWAYS: &str = "true";

/// 规则定义
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    /// 触发条件（析取），`["true"]` 表示总是触发
    #[serde(default, alias = "When")]
    pub when: Vec<String>,
    /// 布尔条件表达式，`"true"` 表示总是满足
    #[serde(default, rename = "if", alias = "If")]
    pub condition: String,
    /// 按顺序执行的动作名称
    #[serde(default, rename = "do", alias = "Do")]
    pub actions: Vec<String>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn when<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.when = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn only_if(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn then<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// 是否总是触发（仅检查第一个触发条件）
    pub fn always_triggered(&self) -> bool {
        self.when.first().is_some_and(|w| w == ALWAYS)
    }

    /// 是否总是满足条件
    pub fn always_satisfied(&self) -> bool {
        self.condition == ALWAYS
    }
}

/// 方法参数：字面量或按实体渲染的模板
#[derive(Debug, Clone)]
pub enum Argument {
    Literal(Value),
    Template(ArgTemplate),
}

impl Argument {
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<ArgTemplate> for Argument {
    fn from(template: ArgTemplate) -> Self {
        Self::Template(template)
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Template(a), Self::Template(b)) => a.source() == b.source(),
            _ => false,
        }
    }
}

// 反序列化时一律视为字面量，模板由加载器在第二遍解析
impl<'de> Deserialize<'de> for Argument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Argument::Literal)
    }
}

impl Serialize for Argument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Template(template) => serializer.serialize_str(template.source()),
        }
    }
}

/// 符号名到实体方法调用的绑定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBinding {
    /// 规则中引用的符号名
    #[serde(default, alias = "Name")]
    pub name: String,
    /// 实体上真实的方法名
    #[serde(default, alias = "Method")]
    pub method: String,
    #[serde(default, alias = "Arguments")]
    pub arguments: Vec<Argument>,
}

impl MethodBinding {
    pub fn new(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            arguments: Vec::new(),
        }
    }

    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }
}

/// 规则配置：条件注册表、动作注册表与有序规则列表
///
/// 由加载器一次构建，之后只读。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, alias = "Conditions")]
    pub conditions: Registry,
    #[serde(default, alias = "Actions")]
    pub actions: Registry,
    #[serde(default, alias = "Rules")]
    pub rules: Vec<Rule>,
}

impl RuleConfig {
    pub fn new(conditions: Registry, actions: Registry, rules: Vec<Rule>) -> Self {
        Self {
            conditions,
            actions,
            rules,
        }
    }
}

/// 单条规则对单个实体的最终状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RuleState {
    /// when 未命中
    NotTriggered,
    /// when 命中但 if 不满足
    ConditionNotMet,
    /// 所有动作已执行
    Executed { actions: Vec<String> },
}

/// 单条规则的评估结果
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    #[serde(flatten)]
    pub state: RuleState,
    pub evaluation_trace: Vec<String>,
}

impl RuleOutcome {
    pub fn new(rule: impl Into<String>, state: RuleState) -> Self {
        Self {
            rule: rule.into(),
            state,
            evaluation_trace: Vec::new(),
        }
    }

    pub fn executed(&self) -> bool {
        matches!(self.state, RuleState::Executed { .. })
    }
}

/// 单个实体的评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityOutcome {
    pub index: usize,
    pub rules: Vec<RuleOutcome>,
}

impl EntityOutcome {
    /// 已执行的规则名称
    pub fn fired(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.executed())
            .map(|r| r.rule.as_str())
            .collect()
    }
}

/// 一次 apply_on 调用的完整报告（仅在全部成功时返回）
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub entities: Vec<EntityOutcome>,
    pub evaluation_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserialization() {
        let json = r#"
        {
            "name": "assign_reviewer",
            "description": "给没有负责人的贡献分配负责人",
            "when": ["labels_changed"],
            "if": "not has_assignee and has_label",
            "do": ["assign"]
        }
        "#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.name, "assign_reviewer");
        assert_eq!(rule.when, vec!["labels_changed"]);
        assert_eq!(rule.condition, "not has_assignee and has_label");
        assert_eq!(rule.actions, vec!["assign"]);
    }

    #[test]
    fn test_rule_capitalized_keys() {
        let rule: Rule = serde_json::from_value(json!({
            "Name": "r1",
            "When": ["true"],
            "If": "true",
            "Do": ["a"]
        }))
        .unwrap();

        assert_eq!(rule.name, "r1");
        assert!(rule.always_triggered());
        assert!(rule.always_satisfied());
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let rule: Rule = serde_json::from_value(json!({ "name": "r1" })).unwrap();
        assert!(rule.when.is_empty());
        assert!(rule.condition.is_empty());
        assert!(rule.actions.is_empty());
        assert!(!rule.always_triggered());
    }

    #[test]
    fn test_binding_arguments_are_literals() {
        let binding: MethodBinding = serde_json::from_value(json!({
            "name": "labels_len",
            "method": "LabelsLen",
            "arguments": [2, "{{ .author }}"]
        }))
        .unwrap();

        assert_eq!(binding.arguments.len(), 2);
        assert_eq!(binding.arguments[0], Argument::Literal(json!(2)));
        assert!(!binding.arguments[1].is_template());
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("r1")
            .description("demo")
            .when(["a", "b"])
            .only_if("a or b")
            .then(["act"]);

        assert_eq!(rule.when.len(), 2);
        assert_eq!(rule.condition, "a or b");
        assert_eq!(rule.actions, vec!["act"]);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RuleOutcome::new(
            "r1",
            RuleState::Executed {
                actions: vec!["act".to_string()],
            },
        );

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], json!("executed"));
        assert_eq!(json["actions"], json!(["act"]));
    }
}
