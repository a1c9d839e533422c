mod attributes;
mod formals;
mod value;

pub use attributes::AttributeStore;
pub use formals::{FormalParameter, Formals, IMPLICIT_ATTRIBUTES, ITERATION_PARAMETER};
pub use value::{Elements, Model, Scalar, ScalarKind, Value};
