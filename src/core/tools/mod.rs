//! Tool-call handling.
//!
//! The agent may request named local capabilities. [`ToolRegistry`] holds the
//! declarations offered in `setup` together with their handlers, and
//! [`ToolDispatcher`] answers every invocation of a batch with exactly one
//! correlated result.

mod dispatcher;
pub mod interviewer;
mod registry;

pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use interviewer::{InterviewSummaryTool, SnapshotTool, interviewer_registry};
pub use registry::{ToolEffect, ToolEntry, ToolHandler, ToolRegistry, ToolReply};
