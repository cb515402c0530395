//! 参数模板模块
//!
//! 方法绑定的字符串参数可以包含 `{{ ... }}` 动作，在调度时针对当前实体渲染。
//!
//! # 主要功能
//!
//! - `TemplateCompiler`: 将参数字符串解析为 `ArgTemplate`，并在解析期解析函数名
//! - `FuncMap`: 调用方提供的自由函数
//! - `RenderContext`: 渲染时的实体、实体视图与方法表

pub mod compiler;
pub mod models;
pub mod renderer;

pub use compiler::TemplateCompiler;
pub use models::*;
pub use renderer::RenderContext;
