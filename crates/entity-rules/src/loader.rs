//! 规则配置加载
//!
//! 从 JSON / YAML 文件或内存中的 JSON 值构建 [`RuleConfig`]。规则文档的内容位于
//! 顶层键 `entityRules` 之下。反序列化完成后，含有 `{{` 的字符串参数会被解析为
//! [`ArgTemplate`]，解析失败则加载失败。

use crate::error::{Result, RuleError};
use crate::method::MethodTable;
use crate::models::{Argument, RuleConfig};
use crate::registry::Registry;
use crate::template::{ArgTemplate, FuncMap, TemplateCompiler};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

/// 规则文档的顶层键
pub const ENTITY_RULES_KEY: &str = "entityRules";

/// 加载选项
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    funcs: FuncMap,
    entity_methods: HashSet<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并模板中可用的自由函数
    pub fn with_func_map(mut self, funcs: FuncMap) -> Self {
        self.funcs.merge(&funcs);
        self
    }

    /// 允许模板调用实体方法（在当前处理的实体上调用）
    pub fn with_entity_funcs<E>(mut self, methods: &MethodTable<E>) -> Self {
        self.entity_methods
            .extend(methods.names().into_iter().map(str::to_string));
        self
    }

    pub fn funcs(&self) -> &FuncMap {
        &self.funcs
    }

    pub fn entity_methods(&self) -> &HashSet<String> {
        &self.entity_methods
    }
}

impl RuleConfig {
    /// 从 JSON 文件加载
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_json_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let document: Value = serde_json::from_str(&content)?;
        Self::from_document(document, options)
    }

    /// 从 YAML 文件加载
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_yaml_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let document: Value = serde_yaml::from_str(&content)?;
        Self::from_document(document, options)
    }

    /// 根据扩展名选择格式加载
    pub fn from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json_file(path, options),
            "yaml" | "yml" => Self::from_yaml_file(path, options),
            _ => Err(RuleError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// 从完整文档加载，读取 `entityRules` 节点
    pub fn from_document(document: Value, options: &LoadOptions) -> Result<Self> {
        let section = match document {
            Value::Object(mut map) => map.remove(ENTITY_RULES_KEY),
            _ => None,
        }
        .ok_or_else(|| RuleError::MissingSection(ENTITY_RULES_KEY.to_string()))?;

        Self::from_value(section, options)
    }

    /// 从 `entityRules` 节点的内容加载
    pub fn from_value(section: Value, options: &LoadOptions) -> Result<Self> {
        let mut config: RuleConfig = serde_json::from_value(section)?;

        let compiler = TemplateCompiler::new();
        let conditions = compile_templates(&mut config.conditions, &compiler, options)?;
        let actions = compile_templates(&mut config.actions, &compiler, options)?;

        info!(
            "规则配置已加载: {} 条规则, {} 个条件, {} 个动作",
            config.rules.len(),
            config.conditions.len(),
            config.actions.len()
        );
        debug!("参数模板: 条件 {} 个, 动作 {} 个", conditions, actions);

        Ok(config)
    }
}

/// 将注册表中含有 `{{` 的字符串参数解析为模板，返回解析出的模板数量
fn compile_templates(
    registry: &mut Registry,
    compiler: &TemplateCompiler,
    options: &LoadOptions,
) -> Result<usize> {
    let mut count = 0;

    for binding in registry.iter_mut() {
        for argument in binding.arguments.iter_mut() {
            let Argument::Literal(Value::String(source)) = argument else {
                continue;
            };
            if !ArgTemplate::is_template(source) {
                continue;
            }

            let template = compiler
                .compile(source, &options.funcs, &options.entity_methods)
                .map_err(|source| RuleError::TemplateParse {
                    binding: binding.name.clone(),
                    source,
                })?;
            *argument = Argument::Template(template);
            count += 1;
        }
    }

    Ok(count)
}
