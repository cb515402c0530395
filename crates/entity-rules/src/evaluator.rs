//! 条件评估器
//!
//! 评估规则的 when（触发）与 if（条件）子句。
//!
//! - when 是谓词的析取，按顺序调用，遇到 true 立即返回
//! - if 先编译为条件树，表达式中的每个谓词按首次出现顺序恰好调用一次，
//!   然后在得到的 名称 -> 布尔值 环境上对条件树做短路求值

use crate::compiler::{CompiledCondition, ConditionCompiler, ConditionNode, LogicalGroup};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::method::MethodTable;
use crate::models::ALWAYS;
use crate::operators::LogicalOperator;
use crate::registry::Registry;
use serde::Serialize;
use std::collections::HashMap;

/// 谓词环境：谓词名 -> 调用结果
type Environment = HashMap<String, bool>;

/// 条件评估器
pub struct ConditionEvaluator<'a, E> {
    dispatcher: Dispatcher<'a, E>,
    compiler: ConditionCompiler,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl<'a, E: Serialize> ConditionEvaluator<'a, E> {
    pub fn new(methods: &'a MethodTable<E>) -> Self {
        Self {
            dispatcher: Dispatcher::new(methods),
            compiler: ConditionCompiler::new(),
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 设置是否记录评估追踪
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// 评估 when 子句
    ///
    /// 第一个元素为 `"true"` 时直接视为触发，不调用任何谓词。
    pub fn is_triggered(
        &self,
        entity: &mut E,
        conditions: &Registry,
        when: &[String],
        trace: &mut Vec<String>,
    ) -> Result<bool> {
        if when.first().is_some_and(|w| w == ALWAYS) {
            self.record(trace, || "when: 总是触发".to_string());
            return Ok(true);
        }

        for (i, name) in when.iter().enumerate() {
            let triggered = self.dispatcher.invoke_bool(entity, conditions, name)?;
            self.record(trace, || format!("when[{}]: {} => {}", i, name, verdict(triggered)));

            if triggered {
                self.record(trace, || format!("when: OR 短路 - {} 匹配", name));
                return Ok(true);
            }
        }

        self.record(trace, || "when: 无匹配".to_string());
        Ok(false)
    }

    /// 评估 if 子句
    ///
    /// 表达式为 `"true"` 时直接视为满足，不调用任何谓词。
    pub fn is_satisfied(
        &self,
        entity: &mut E,
        conditions: &Registry,
        expression: &str,
        trace: &mut Vec<String>,
    ) -> Result<bool> {
        if expression == ALWAYS {
            self.record(trace, || "if: 总是满足".to_string());
            return Ok(true);
        }

        let compiled = self.compiler.compile(expression)?;
        self.evaluate_condition(entity, conditions, &compiled, trace)
    }

    /// 评估已编译的 if 子句
    pub fn evaluate_condition(
        &self,
        entity: &mut E,
        conditions: &Registry,
        compiled: &CompiledCondition,
        trace: &mut Vec<String>,
    ) -> Result<bool> {
        if compiled.source == ALWAYS {
            self.record(trace, || "if: 总是满足".to_string());
            return Ok(true);
        }

        let mut env = Environment::with_capacity(compiled.predicates.len());
        for name in &compiled.predicates {
            let value = self.dispatcher.invoke_bool(entity, conditions, name)?;
            self.record(trace, || format!("if: {} => {}", name, verdict(value)));
            env.insert(name.clone(), value);
        }

        let satisfied = self.evaluate_node(&compiled.root, &env, trace, "if");
        self.record(trace, || format!("if: {} => {}", compiled.root, verdict(satisfied)));

        Ok(satisfied)
    }

    /// 递归评估条件节点
    fn evaluate_node(
        &self,
        node: &ConditionNode,
        env: &Environment,
        trace: &mut Vec<String>,
        path: &str,
    ) -> bool {
        match node {
            ConditionNode::Predicate(name) => env.get(name).copied().unwrap_or(false),
            ConditionNode::Literal(value) => *value,
            ConditionNode::Not(inner) => !self.evaluate_node(inner, env, trace, path),
            ConditionNode::Group(group) => self.evaluate_group(group, env, trace, path),
        }
    }

    /// 评估逻辑组节点（短路求值）
    fn evaluate_group(
        &self,
        group: &LogicalGroup,
        env: &Environment,
        trace: &mut Vec<String>,
        path: &str,
    ) -> bool {
        // AND 遇到 false 停止，OR 遇到 true 停止
        let stop_on = group.operator == LogicalOperator::Or;

        for (i, child) in group.children.iter().enumerate() {
            let child_path = format!("{}.children[{}]", path, i);
            let value = self.evaluate_node(child, env, trace, &child_path);

            if value == stop_on {
                self.record(trace, || {
                    format!(
                        "{}: {} 短路 - 子节点 {} ({}) {}",
                        path,
                        group.operator.to_string().to_uppercase(),
                        i,
                        child,
                        verdict(value)
                    )
                });
                return stop_on;
            }
        }

        !stop_on
    }

    fn record(&self, trace: &mut Vec<String>, entry: impl FnOnce() -> String) {
        if self.trace_enabled {
            trace.push(entry());
        }
    }
}

fn verdict(value: bool) -> &'static str {
    if value { "MATCHED" } else { "NOT_MATCHED" }
}
