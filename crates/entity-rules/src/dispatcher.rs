//! 方法调度器
//!
//! 按符号名在注册表中找到绑定，渲染参数后在实体上调用真实方法。
//! 调用过程中的任何故障都被转换为 [`RuleError::Invocation`]。

use crate::error::{InvokeFault, Result, RuleError};
use crate::method::{MethodTable, Returns};
use crate::models::Argument;
use crate::registry::Registry;
use crate::template::{EntityView, RenderContext};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// 方法调度器
pub struct Dispatcher<'a, E> {
    methods: &'a MethodTable<E>,
}

impl<'a, E: Serialize> Dispatcher<'a, E> {
    pub fn new(methods: &'a MethodTable<E>) -> Self {
        Self { methods }
    }

    /// 调用注册表中名为 `name` 的绑定，返回原始返回值
    pub fn invoke(&self, entity: &mut E, registry: &Registry, name: &str) -> Result<Returns> {
        let binding = registry
            .get_by_name(name)
            .ok_or_else(|| RuleError::MethodNotRegistered(name.to_string()))?;

        let invocation = |source: InvokeFault| RuleError::Invocation {
            name: name.to_string(),
            source,
        };

        let args = self
            .resolve_arguments(entity, &binding.arguments)
            .map_err(invocation)?;

        let method = self
            .methods
            .get(&binding.method)
            .ok_or_else(|| invocation(InvokeFault::MethodNotFound(binding.method.clone())))?;

        trace!(binding = name, method = %binding.method, args = args.len(), "调用实体方法");

        method.invoke(entity, &args).map_err(invocation)
    }

    /// 调用条件绑定，要求第一个返回值为布尔值
    pub fn invoke_bool(&self, entity: &mut E, registry: &Registry, name: &str) -> Result<bool> {
        let returns = self.invoke(entity, registry, name)?;

        match returns.first() {
            Some(Value::Bool(value)) => Ok(*value),
            _ => Err(RuleError::MethodReturnNotBool(name.to_string())),
        }
    }

    /// 解析参数：字面量原样传递，模板针对当前实体渲染为字符串
    fn resolve_arguments(
        &self,
        entity: &mut E,
        arguments: &[Argument],
    ) -> std::result::Result<Vec<Value>, InvokeFault> {
        if !arguments.iter().any(Argument::is_template) {
            return Ok(arguments
                .iter()
                .map(|arg| match arg {
                    Argument::Literal(value) => value.clone(),
                    Argument::Template(template) => Value::String(template.source().to_string()),
                })
                .collect());
        }

        // 只有存在模板参数时才构建实体视图
        let view = EntityView::from_entity(&*entity)?;
        let mut ctx = RenderContext::new(entity, &view, self.methods);

        let mut resolved = Vec::with_capacity(arguments.len());
        for arg in arguments {
            let value = match arg {
                Argument::Literal(value) => value.clone(),
                Argument::Template(template) => Value::String(template.render(&mut ctx)?),
            };
            resolved.push(value);
        }
        Ok(resolved)
    }
}
