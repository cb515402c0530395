//! 方法绑定注册表
//!
//! 按符号名保存条件与动作的绑定，规则中的 when/if/do 通过符号名引用它们。

use crate::error::{Result, RuleError};
use crate::models::MethodBinding;
use serde::{Deserialize, Serialize};

/// 方法绑定注册表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    bindings: Vec<MethodBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加绑定（同名时以先注册者为准）
    pub fn with(mut self, binding: MethodBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn push(&mut self, binding: MethodBinding) {
        self.bindings.push(binding);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodBinding> {
        self.bindings.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MethodBinding> {
        self.bindings.iter_mut()
    }

    /// 校验每个绑定的名称与方法都已填写
    pub fn validate(&self) -> Result<()> {
        for binding in &self.bindings {
            if binding.name.is_empty() {
                return Err(RuleError::EmptyMethodExecutionName {
                    method: binding.method.clone(),
                });
            }
            if binding.method.is_empty() {
                return Err(RuleError::EmptyMethodExecutionMethod {
                    name: binding.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// 按符号名查找绑定，返回第一个匹配项
    pub fn get_by_name(&self, name: &str) -> Option<&MethodBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }
}

impl FromIterator<MethodBinding> for Registry {
    fn from_iter<T: IntoIterator<Item = MethodBinding>>(iter: T) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_by_name() {
        let registry = Registry::new()
            .with(MethodBinding::new("has_assignee", "HasAssignee"))
            .with(MethodBinding::new("has_label", "HasLabel").arg(json!("kind/bug")));

        let binding = registry.get_by_name("has_label").unwrap();
        assert_eq!(binding.method, "HasLabel");
        assert_eq!(binding.arguments.len(), 1);
        assert!(registry.get_by_name("missing").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let registry = Registry::new()
            .with(MethodBinding::new("dup", "First"))
            .with(MethodBinding::new("dup", "Second"));

        assert_eq!(registry.get_by_name("dup").unwrap().method, "First");
    }

    #[test]
    fn test_validate_empty_name() {
        let registry = Registry::new().with(MethodBinding::new("", "HasAssignee"));

        let err = registry.validate().unwrap_err();
        assert!(matches!(
            err,
            RuleError::EmptyMethodExecutionName { method } if method == "HasAssignee"
        ));
    }

    #[test]
    fn test_validate_empty_method() {
        let registry = Registry::new()
            .with(MethodBinding::new("ok", "Ok"))
            .with(MethodBinding::new("broken", ""));

        let err = registry.validate().unwrap_err();
        assert!(matches!(err, RuleError::EmptyMethodExecutionMethod { name } if name == "broken"));
    }

    #[test]
    fn test_deserialize_from_list() {
        let registry: Registry = serde_json::from_value(json!([
            { "name": "a", "method": "A" },
            { "name": "b", "method": "B", "arguments": [1, true] }
        ]))
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.validate().is_ok());
    }
}
