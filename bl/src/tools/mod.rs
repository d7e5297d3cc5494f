//! Sandboxed tool surface
//!
//! Each task gets a `ToolExecutor` bound to its own workspace root. Tools
//! cannot reach outside that root, and tool-domain failures come back as
//! structured results rather than errors.

mod context;
mod error;
mod executor;
mod traits;

pub mod builtin;

pub use context::{ToolContext, ToolLimits};
pub use error::ToolError;
pub use executor::{ToolDispatch, ToolExecutor, ToolKind};
pub use traits::{Tool, ToolResult, parse_args};
