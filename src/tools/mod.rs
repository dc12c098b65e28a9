//! Tool system for function calling.

pub mod arguments;
pub mod builtin;
pub mod invoker;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use builtin::Calculator;
pub use invoker::{ToolInvoker, ToolOutcome};
pub use tool::{FnTool, Tool, ToolContext, ToolSet};
pub use types::{ParameterBuilder, ToolParameters};
