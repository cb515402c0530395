//! 规则引擎
//!
//! 对每个实体按声明顺序评估规则：when 命中后检查 if，满足后依次执行 do 中的动作。
//! 第一个错误会中止整次调用，不返回部分结果。

use crate::compiler::{CompiledCondition, ConditionCompiler};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::method::MethodTable;
use crate::models::{ApplyReport, EntityOutcome, Rule, RuleConfig, RuleOutcome, RuleState};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 绑定到某种实体类型的规则引擎
pub struct EntityRules<E> {
    config: RuleConfig,
    methods: MethodTable<E>,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

/// 单条规则在一个实体上的评估结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    NotTriggered,
    ConditionNotMet,
    Executed,
}

impl Verdict {
    fn into_state(self, rule: &Rule) -> RuleState {
        match self {
            Self::NotTriggered => RuleState::NotTriggered,
            Self::ConditionNotMet => RuleState::ConditionNotMet,
            Self::Executed => RuleState::Executed {
                actions: rule.actions.clone(),
            },
        }
    }
}

/// if 子句编译缓存，按规则下标存放，规则首次需要评估 if 时编译
struct ConditionCache {
    compiler: ConditionCompiler,
    compiled: Vec<Option<CompiledCondition>>,
}

impl ConditionCache {
    fn new(rules: usize) -> Self {
        Self {
            compiler: ConditionCompiler::new(),
            compiled: vec![None; rules],
        }
    }

    fn get(&mut self, index: usize, expression: &str) -> Result<&CompiledCondition> {
        let compiled = match self.compiled[index].take() {
            Some(compiled) => compiled,
            None => self.compiler.compile(expression)?,
        };
        Ok(self.compiled[index].insert(compiled))
    }
}

/// 一次 apply 调用内跨实体共享的状态
struct ApplyPass<'a, E> {
    evaluator: ConditionEvaluator<'a, E>,
    dispatcher: Dispatcher<'a, E>,
    conditions: ConditionCache,
    /// 是否为报告收集每条规则的结果
    collect: bool,
}

impl<E: Serialize> EntityRules<E> {
    pub fn new(config: RuleConfig, methods: MethodTable<E>) -> Self {
        Self {
            config,
            methods,
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn methods(&self) -> &MethodTable<E> {
        &self.methods
    }

    /// 校验配置结构
    ///
    /// 依次校验动作注册表、条件注册表与规则列表。
    /// 只检查结构，不检查引用的名称是否存在。
    pub fn validate(&self) -> Result<()> {
        self.config.actions.validate()?;
        self.config.conditions.validate()?;

        if self.config.rules.is_empty() {
            return Err(RuleError::EmptyRules);
        }

        for (index, rule) in self.config.rules.iter().enumerate() {
            validate_rule(index, rule)?;
        }

        Ok(())
    }

    /// 将规则应用到一组实体
    pub fn apply_on<'e, I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'e mut E>,
        E: 'e,
    {
        self.run(entities, None)
    }

    /// 将规则应用到单个实体
    pub fn apply_on_one(&self, entity: &mut E) -> Result<EntityOutcome> {
        let mut report = ApplyReport::default();
        self.run([entity], Some(&mut report))?;
        Ok(report.entities.pop().unwrap_or_default())
    }

    /// 将规则应用到一组实体，并返回每个实体上每条规则的结果
    pub fn apply_on_with_report<'e, I>(&self, entities: I) -> Result<ApplyReport>
    where
        I: IntoIterator<Item = &'e mut E>,
        E: 'e,
    {
        let start = Instant::now();

        let mut report = ApplyReport::default();
        self.run(entities, Some(&mut report))?;

        report.evaluation_time_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    /// 校验后逐个处理实体，`report` 为 None 时不构建任何结果
    #[instrument(
        skip_all,
        fields(
            rules = self.config.rules.len(),
            trace = self.trace_enabled,
            report = report.is_some()
        )
    )]
    fn run<'e, I>(&self, entities: I, mut report: Option<&mut ApplyReport>) -> Result<()>
    where
        I: IntoIterator<Item = &'e mut E>,
        E: 'e,
    {
        let start = Instant::now();

        self.validate().inspect_err(|e| warn!("规则配置校验失败: {}", e))?;

        let collect = report.is_some();
        let mut pass = ApplyPass {
            evaluator: ConditionEvaluator::new(&self.methods).trace(self.trace_enabled && collect),
            dispatcher: Dispatcher::new(&self.methods),
            conditions: ConditionCache::new(self.config.rules.len()),
            collect,
        };

        let mut processed = 0;
        for (index, entity) in entities.into_iter().enumerate() {
            let outcome = self
                .process_entity(index, entity, &mut pass)
                .inspect_err(|e| warn!("第 {} 个实体处理失败，中止: {}", index, e))?;
            if let (Some(report), Some(outcome)) = (report.as_deref_mut(), outcome) {
                report.entities.push(outcome);
            }
            processed += 1;
        }

        debug!(
            "规则应用完成: {} 个实体, 耗时 {}ms",
            processed,
            start.elapsed().as_millis()
        );

        Ok(())
    }

    #[instrument(skip(self, entity, pass))]
    fn process_entity(
        &self,
        index: usize,
        entity: &mut E,
        pass: &mut ApplyPass<'_, E>,
    ) -> Result<Option<EntityOutcome>> {
        let mut rules = pass
            .collect
            .then(|| Vec::with_capacity(self.config.rules.len()));

        for (position, rule) in self.config.rules.iter().enumerate() {
            let mut trace = Vec::new();
            let verdict = self.apply_rule(position, rule, entity, pass, &mut trace)?;

            if let Some(rules) = rules.as_mut() {
                let mut outcome = RuleOutcome::new(rule.name.clone(), verdict.into_state(rule));
                outcome.evaluation_trace = trace;
                rules.push(outcome);
            }
        }

        Ok(rules.map(|rules| EntityOutcome { index, rules }))
    }

    fn apply_rule(
        &self,
        position: usize,
        rule: &Rule,
        entity: &mut E,
        pass: &mut ApplyPass<'_, E>,
        trace: &mut Vec<String>,
    ) -> Result<Verdict> {
        let conditions = &self.config.conditions;
        let condition_error = |e: RuleError| RuleError::Condition {
            rule: rule.name.clone(),
            source: Box::new(e),
        };

        let triggered = pass
            .evaluator
            .is_triggered(entity, conditions, &rule.when, trace)
            .map_err(|e| RuleError::Trigger {
                rule: rule.name.clone(),
                source: Box::new(e),
            })?;
        if !triggered {
            debug!(rule = %rule.name, "规则未触发");
            return Ok(Verdict::NotTriggered);
        }

        let compiled = pass
            .conditions
            .get(position, &rule.condition)
            .map_err(condition_error)?;
        let satisfied = pass
            .evaluator
            .evaluate_condition(entity, conditions, compiled, trace)
            .map_err(condition_error)?;
        if !satisfied {
            debug!(rule = %rule.name, "规则条件不满足");
            return Ok(Verdict::ConditionNotMet);
        }

        for action in &rule.actions {
            pass.dispatcher
                .invoke(entity, &self.config.actions, action)
                .map_err(|e| RuleError::Action {
                    rule: rule.name.clone(),
                    source: Box::new(e),
                })?;
            debug!(rule = %rule.name, action = %action, "动作已执行");
        }

        Ok(Verdict::Executed)
    }
}

/// 规则的 name、when、if、do 都必须填写
fn validate_rule(index: usize, rule: &Rule) -> Result<()> {
    if rule.name.is_empty() {
        return Err(RuleError::EmptyRuleName { index });
    }
    if rule.when.is_empty() {
        return Err(RuleError::EmptyRuleWhen {
            rule: rule.name.clone(),
        });
    }
    if rule.condition.is_empty() {
        return Err(RuleError::EmptyRuleIf {
            rule: rule.name.clone(),
        });
    }
    if rule.actions.is_empty() {
        return Err(RuleError::EmptyRuleDo {
            rule: rule.name.clone(),
        });
    }
    Ok(())
}
