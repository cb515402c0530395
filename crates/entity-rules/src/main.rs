//! 实体规则演示程序
//!
//! 从配置中读取规则文档路径，将规则应用到一个 Contribution 实体后输出结果。
//!
//! 用法：`entity-rules [contribution.json]`，省略参数时从标准输入读取实体。

use anyhow::{Context, Result};
use entity_rules::{EntityRules, FuncMap, LoadOptions, MethodTable, RuleConfig};
use entity_rules_shared::config::AppConfig;
use entity_rules_shared::observability;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use tracing::info;

/// 代码贡献（如合并请求）
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Contribution {
    assignee: String,
    author: String,
    labels: Vec<String>,
}

impl Contribution {
    fn labels_len(&self, len: usize) -> bool {
        self.labels.len() == len
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn add_label(&mut self, label: String) {
        if !self.has_label(&label) {
            self.labels.push(label);
        }
    }

    fn has_assignee(&self) -> bool {
        !self.assignee.is_empty()
    }

    fn set_assignee(&mut self, assignee: String) {
        self.assignee = assignee;
    }
}

fn contribution_methods() -> MethodTable<Contribution> {
    MethodTable::new()
        .method("LabelsLen", |c: &mut Contribution, len: usize| c.labels_len(len))
        .method("HasLabel", |c: &mut Contribution, label: String| c.has_label(&label))
        .method("AddLabel", |c: &mut Contribution, label: String| c.add_label(label))
        .method("HasAssignee", |c: &mut Contribution| c.has_assignee())
        .method("SetAssignee", |c: &mut Contribution, assignee: String| {
            c.set_assignee(assignee)
        })
}

/// 模板中可用的自由函数
fn template_funcs() -> FuncMap {
    FuncMap::new()
        .with("lower", |args: &[Value]| match args {
            [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
            _ => Err("lower 需要一个字符串参数".to_string()),
        })
        .with("trim", |args: &[Value]| match args {
            [Value::String(s)] => Ok(Value::String(s.trim().to_string())),
            _ => Err("trim 需要一个字符串参数".to_string()),
        })
}

fn read_contribution(path: Option<String>) -> Result<Contribution> {
    let content = match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("读取实体文件失败: {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("从标准输入读取实体失败")?;
            buf
        }
    };

    serde_json::from_str(&content).context("实体 JSON 解析失败")
}

fn main() -> Result<()> {
    let config = AppConfig::load("entity-rules").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    observability::init(&config.observability())?;

    let methods = contribution_methods();
    let options = LoadOptions::new()
        .with_func_map(template_funcs())
        .with_entity_funcs(&methods);

    let rules = RuleConfig::from_file(&config.engine.rules_path, &options)
        .with_context(|| format!("加载规则失败: {}", config.engine.rules_path))?;
    info!("Loaded {} rules from {}", rules.rules.len(), config.engine.rules_path);

    let mut engine = EntityRules::new(rules, methods);
    if config.engine.trace_enabled {
        engine = engine.with_trace();
    }

    let mut contribution = read_contribution(std::env::args().nth(1))?;

    let report = engine.apply_on_with_report([&mut contribution])?;
    for outcome in &report.entities {
        info!(fired = ?outcome.fired(), "Rules applied");
        for rule in &outcome.rules {
            for line in &rule.evaluation_trace {
                info!(rule = %rule.rule, "{}", line);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&contribution)?);
    Ok(())
}
