//! 实体规则引擎
//!
//! 针对宿主实体声明式地定义规则并执行：
//! - when：触发条件（谓词的析取），`["true"]` 表示总是触发
//! - if：由谓词组成的布尔表达式（`and` / `or` / `not` / 括号 / `== true`）
//! - do：按顺序执行的动作
//!
//! 引擎不直接认识实体的方法，而是通过注册表中的符号名绑定到 [`MethodTable`] 中
//! 注册的闭包，参数可以是字面量，也可以是针对当前实体渲染的模板。
//!
//! ```ignore
//! let methods = MethodTable::new()
//!     .method("HasAssignee", |c: &mut Contribution| c.assignee.is_some())
//!     .method("Assign", |c: &mut Contribution, who: String| c.assignee = Some(who));
//!
//! let options = LoadOptions::new().with_entity_funcs(&methods);
//! let config = RuleConfig::from_file("rules.yaml", &options)?;
//!
//! EntityRules::new(config, methods).apply_on([&mut contribution])?;
//! ```

pub mod compiler;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod method;
pub mod models;
pub mod operators;
pub mod registry;
pub mod template;

pub use compiler::{CompiledCondition, ConditionCompiler, ConditionNode, LogicalGroup};
pub use dispatcher::Dispatcher;
pub use engine::EntityRules;
pub use error::{InvokeFault, Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use loader::{ENTITY_RULES_KEY, LoadOptions};
pub use method::{Handler, IntoReturn, Method, MethodTable, Returns};
pub use models::{
    ALWAYS, ApplyReport, Argument, EntityOutcome, MethodBinding, Rule, RuleConfig, RuleOutcome,
    RuleState,
};
pub use operators::{Comparison, LogicalOperator};
pub use registry::Registry;
pub use template::{ArgTemplate, EntityView, FuncMap, TemplateError};
