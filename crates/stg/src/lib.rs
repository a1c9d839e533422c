pub mod compiler;
pub mod diagnostic;
pub mod group;
pub mod interpreter;
pub mod parser;
pub mod types;

pub use compiler::{CompileError, CompiledTemplate, TemplateDirectory};
pub use diagnostic::{
    CollectingListener, Diagnostic, DiagnosticListener, ErrorCategory, ErrorKind, Location,
    Phase, Severity, TracingListener, compute_suggestions,
};
pub use group::{
    AttributeError, AttributeRenderer, Group, GroupError, StringRenderer, TemplateInstance,
};
pub use interpreter::{Interpreter, Trace};
pub use parser::ParseError;
pub use types::{AttributeStore, FormalParameter, Formals, Model, Scalar, ScalarKind, Value};

/// Creates a `BTreeMap<String, Value>` from key-value pairs.
///
/// Values are converted via `Into<Value>`. Wrap the result in
/// [`Value::from`] to pass it to a template as a map attribute.
///
/// # Example
///
/// ```
/// use stg::{attrs, Value};
///
/// let user = attrs! { "name" => "Ter", "id" => 7 };
/// assert_eq!(user.len(), 2);
/// assert_eq!(user["name"].as_str(), Some("Ter"));
/// let value = Value::from(user);
/// assert!(value.is_truthy());
/// ```
#[macro_export]
macro_rules! attrs {
    {} => {
        ::std::collections::BTreeMap::<String, $crate::Value>::new()
    };
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            let mut map = ::std::collections::BTreeMap::<String, $crate::Value>::new();
            $(
                map.insert($key.to_string(), ::std::convert::Into::<$crate::Value>::into($value));
            )+
            map
        }
    };
}
