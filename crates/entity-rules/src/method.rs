//! 实体方法表
//!
//! 每种实体类型在构建配置时注册一张方法表：真实方法名 -> 类型化闭包。
//! 调度器在评估时按名称取出闭包，把 JSON 参数解码为闭包的参数类型后调用。
//!
//! ```ignore
//! let methods = MethodTable::new()
//!     .method("HasAssignee", |c: &mut Contribution| c.assignee.is_some())
//!     .method("AddLabel", |c: &mut Contribution, label: String| c.labels.push(label));
//! ```

use crate::error::InvokeFault;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// 方法调用的返回值（零个或多个）
pub type Returns = Vec<Value>;

/// 将闭包返回值转换为 [`Returns`]
///
/// `Result::Err` 会被转换为 [`InvokeFault::Failed`]。
pub trait IntoReturn {
    fn into_return(self) -> Result<Returns, InvokeFault>;
}

impl IntoReturn for () {
    fn into_return(self) -> Result<Returns, InvokeFault> {
        Ok(Vec::new())
    }
}

macro_rules! impl_into_return {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReturn for $ty {
                fn into_return(self) -> Result<Returns, InvokeFault> {
                    Ok(vec![Value::from(self)])
                }
            }
        )*
    };
}

impl_into_return!(bool, String, &'static str, i32, i64, u32, u64, usize, f64, Value, Vec<String>);

impl<T, Er> IntoReturn for Result<T, Er>
where
    T: IntoReturn,
    Er: fmt::Display,
{
    fn into_return(self) -> Result<Returns, InvokeFault> {
        match self {
            Ok(value) => value.into_return(),
            Err(e) => Err(InvokeFault::Failed(e.to_string())),
        }
    }
}

/// 可注册为实体方法的处理函数
///
/// 为 `Fn(&mut E, A1, .., An) -> R`（n <= 4）自动实现，`Args` 为参数类型元组。
pub trait Handler<E, Args>: Send + Sync + 'static {
    fn arity(&self) -> usize;

    fn call(&self, entity: &mut E, args: &[Value]) -> Result<Returns, InvokeFault>;
}

fn decode<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, InvokeFault> {
    let raw = args.get(index).ok_or(InvokeFault::ArityMismatch {
        expected: index + 1,
        actual: args.len(),
    })?;

    serde_json::from_value(raw.clone()).map_err(|e| InvokeFault::ArgumentType {
        index,
        message: e.to_string(),
    })
}

macro_rules! impl_handler {
    ($arity:expr; $($arg:ident),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
        impl<E, F, R, $($arg,)*> Handler<E, ($($arg,)*)> for F
        where
            F: Fn(&mut E, $($arg,)*) -> R + Send + Sync + 'static,
            R: IntoReturn,
            $($arg: DeserializeOwned,)*
        {
            fn arity(&self) -> usize {
                $arity
            }

            fn call(&self, entity: &mut E, args: &[Value]) -> Result<Returns, InvokeFault> {
                if args.len() != $arity {
                    return Err(InvokeFault::ArityMismatch {
                        expected: $arity,
                        actual: args.len(),
                    });
                }

                let mut index = 0;
                $(
                    let $arg: $arg = decode(args, index)?;
                    index += 1;
                )*

                (self)(entity, $($arg,)*).into_return()
            }
        }
    };
}

impl_handler!(0;);
impl_handler!(1; A1);
impl_handler!(2; A1, A2);
impl_handler!(3; A1, A2, A3);
impl_handler!(4; A1, A2, A3, A4);

type BoxedCall<E> = Arc<dyn Fn(&mut E, &[Value]) -> Result<Returns, InvokeFault> + Send + Sync>;

/// 已注册的实体方法
pub struct Method<E> {
    name: String,
    arity: usize,
    call: BoxedCall<E>,
}

impl<E> Method<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// 调用方法，闭包内的 panic 会被捕获并转换为 [`InvokeFault::Panicked`]
    pub fn invoke(&self, entity: &mut E, args: &[Value]) -> Result<Returns, InvokeFault> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.call)(entity, args)))
            .unwrap_or_else(|payload| Err(InvokeFault::Panicked(panic_message(payload.as_ref()))))
    }
}

impl<E> Clone for Method<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            arity: self.arity,
            call: Arc::clone(&self.call),
        }
    }
}

impl<E> fmt::Debug for Method<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 实体类型的方法表
pub struct MethodTable<E> {
    methods: HashMap<String, Method<E>>,
}

impl<E: 'static> MethodTable<E> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// 注册方法，同名方法会被覆盖
    pub fn method<H, T>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<E, T>,
        T: 'static,
    {
        self.insert(name, handler);
        self
    }

    pub fn insert<H, T>(&mut self, name: impl Into<String>, handler: H)
    where
        H: Handler<E, T>,
        T: 'static,
    {
        let name = name.into();
        let arity = handler.arity();
        let call: BoxedCall<E> =
            Arc::new(move |entity: &mut E, args: &[Value]| handler.call(entity, args));

        self.methods.insert(name.clone(), Method { name, arity, call });
    }
}

impl<E> MethodTable<E> {
    pub fn get(&self, name: &str) -> Option<&Method<E>> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// 所有方法名（排序后返回）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<E: 'static> Default for MethodTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for MethodTable<E> {
    fn clone(&self) -> Self {
        Self {
            methods: self.methods.clone(),
        }
    }
}

impl<E> fmt::Debug for MethodTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        value: i64,
        labels: Vec<String>,
    }

    fn table() -> MethodTable<Counter> {
        MethodTable::new()
            .method("Value", |c: &mut Counter| c.value)
            .method("IsPositive", |c: &mut Counter| c.value > 0)
            .method("Add", |c: &mut Counter, n: i64| c.value += n)
            .method("AddLabel", |c: &mut Counter, label: String| c.labels.push(label))
            .method("Between", |c: &mut Counter, low: i64, high: i64| {
                c.value >= low && c.value <= high
            })
            .method("Checked", |c: &mut Counter, n: i64| -> Result<i64, String> {
                if n < 0 {
                    Err(format!("negative input {}", n))
                } else {
                    c.value += n;
                    Ok(c.value)
                }
            })
            .method("Explode", |_: &mut Counter| -> bool { panic!("boom") })
    }

    #[test]
    fn test_invoke_zero_args() {
        let methods = table();
        let mut counter = Counter {
            value: 3,
            ..Default::default()
        };

        let result = methods.get("IsPositive").unwrap().invoke(&mut counter, &[]).unwrap();
        assert_eq!(result, vec![json!(true)]);
    }

    #[test]
    fn test_invoke_mutates_entity() {
        let methods = table();
        let mut counter = Counter::default();

        let result = methods
            .get("Add")
            .unwrap()
            .invoke(&mut counter, &[json!(5)])
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(counter.value, 5);

        methods
            .get("AddLabel")
            .unwrap()
            .invoke(&mut counter, &[json!("kind/bug")])
            .unwrap();
        assert_eq!(counter.labels, vec!["kind/bug"]);
    }

    #[test]
    fn test_arity() {
        let methods = table();
        assert_eq!(methods.get("Value").unwrap().arity(), 0);
        assert_eq!(methods.get("Between").unwrap().arity(), 2);

        let mut counter = Counter::default();
        let err = methods
            .get("Between")
            .unwrap()
            .invoke(&mut counter, &[json!(1)])
            .unwrap_err();
        assert!(matches!(err, InvokeFault::ArityMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_argument_type_mismatch() {
        let methods = table();
        let mut counter = Counter::default();

        let err = methods
            .get("Add")
            .unwrap()
            .invoke(&mut counter, &[json!("five")])
            .unwrap_err();
        assert!(matches!(err, InvokeFault::ArgumentType { index: 0, .. }));
        assert_eq!(counter.value, 0);
    }

    #[test]
    fn test_result_error_becomes_fault() {
        let methods = table();
        let mut counter = Counter::default();

        let ok = methods
            .get("Checked")
            .unwrap()
            .invoke(&mut counter, &[json!(2)])
            .unwrap();
        assert_eq!(ok, vec![json!(2)]);

        let err = methods
            .get("Checked")
            .unwrap()
            .invoke(&mut counter, &[json!(-1)])
            .unwrap_err();
        assert!(matches!(err, InvokeFault::Failed(message) if message.contains("negative")));
    }

    #[test]
    fn test_panic_is_captured() {
        let methods = table();
        let mut counter = Counter::default();

        let err = methods.get("Explode").unwrap().invoke(&mut counter, &[]).unwrap_err();
        assert!(matches!(err, InvokeFault::Panicked(message) if message == "boom"));
    }

    #[test]
    fn test_names_sorted() {
        let methods = table();
        let names = methods.names();
        assert_eq!(names.first(), Some(&"Add"));
        assert!(methods.contains("Explode"));
        assert!(!methods.contains("Missing"));
        assert_eq!(methods.len(), 7);
    }
}
