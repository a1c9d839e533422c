//! Template groups, instances and attribute renderers.

mod error;
mod instance;
mod registry;
mod renderer;

pub use error::{AttributeError, GroupError};
pub(crate) use error::ResolveError;
pub use instance::TemplateInstance;
pub use registry::{ANONYMOUS_TEMPLATE, Group};
pub use renderer::{AttributeRenderer, StringRenderer};
