//! 模板渲染
//!
//! 针对具体实体渲染 [`ArgTemplate`]，结果总是字符串。

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};

use super::models::{
    ArgTemplate, EntityView, FuncRef, Operand, Pipeline, TemplateError, TemplatePart,
};
use crate::method::{MethodTable, panic_message};

/// 渲染上下文
pub struct RenderContext<'a, E> {
    pub entity: &'a mut E,
    pub view: &'a EntityView,
    pub methods: &'a MethodTable<E>,
}

impl<'a, E> RenderContext<'a, E> {
    pub fn new(entity: &'a mut E, view: &'a EntityView, methods: &'a MethodTable<E>) -> Self {
        Self {
            entity,
            view,
            methods,
        }
    }
}

impl ArgTemplate {
    /// 渲染模板
    pub fn render<E>(&self, ctx: &mut RenderContext<'_, E>) -> Result<String, TemplateError> {
        let mut output = String::with_capacity(self.source.len());

        for part in &self.parts {
            match part {
                TemplatePart::Static(text) => output.push_str(text),
                TemplatePart::Action(pipeline) => {
                    let value = eval_pipeline(pipeline, ctx)?;
                    output.push_str(&stringify(&value));
                }
            }
        }

        Ok(output)
    }
}

fn eval_pipeline<E>(
    pipeline: &Pipeline,
    ctx: &mut RenderContext<'_, E>,
) -> Result<Value, TemplateError> {
    match pipeline {
        Pipeline::Operand(operand) => eval_operand(operand, ctx.view),
        Pipeline::Call { func, args } => match func {
            FuncRef::Free { name, func } => {
                let values = args
                    .iter()
                    .map(|arg| eval_operand(arg, ctx.view))
                    .collect::<Result<Vec<_>, _>>()?;
                // 自由函数由调用方提供，panic 与实体方法一样转换为错误
                panic::catch_unwind(AssertUnwindSafe(|| func(&values)))
                    .unwrap_or_else(|payload| {
                        Err(format!("执行时 panic: {}", panic_message(payload.as_ref())))
                    })
                    .map_err(|message| TemplateError::Function {
                        name: name.clone(),
                        message,
                    })
            }
            FuncRef::Entity { name } => {
                // 实体方法的首个 `.` 参数表示接收者本身，可省略
                let args = match args.first() {
                    Some(Operand::Dot) => &args[1..],
                    _ => &args[..],
                };
                let values = args
                    .iter()
                    .map(|arg| eval_operand(arg, ctx.view))
                    .collect::<Result<Vec<_>, _>>()?;

                let method = ctx.methods.get(name).ok_or_else(|| TemplateError::Function {
                    name: name.clone(),
                    message: "实体类型未提供该方法".to_string(),
                })?;
                let mut returns = method
                    .invoke(&mut *ctx.entity, &values)
                    .map_err(|fault| TemplateError::Function {
                        name: name.clone(),
                        message: fault.to_string(),
                    })?;

                Ok(match returns.len() {
                    0 => Value::Null,
                    1 => returns.remove(0),
                    _ => Value::Array(returns),
                })
            }
        },
    }
}

fn eval_operand(operand: &Operand, view: &EntityView) -> Result<Value, TemplateError> {
    match operand {
        Operand::Dot => Ok(view.data().clone()),
        Operand::Field(path) => view
            .get_field(path)
            .cloned()
            .ok_or_else(|| TemplateError::FieldNotFound(Operand::field_path(path))),
        Operand::Literal(value) => Ok(value.clone()),
    }
}

/// 字符串原样输出，null 输出为空，其余输出 JSON 文本
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
