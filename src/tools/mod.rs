//! Tool registry, invocation pipeline, and built-in tools.

pub mod builtin;
pub mod pipeline;
pub mod registry;

pub use pipeline::ToolPipeline;
pub use registry::{BeforeFetch, ParamDef, ParamType, ToolHandler, ToolRegistry, ToolSpec};
