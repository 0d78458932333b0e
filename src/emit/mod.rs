//! GitHub Actions workflow generation.
//!
//! Execution stages are rendered as jobs chained through `needs`, with one
//! shell step per job description of each node.

mod document;
mod emitter;
mod steps;

pub use document::{
    Dispatch, DispatchInput, IssueTrigger, Job, OrderedMap, Step, Triggers, WorkflowDocument,
};
pub use emitter::{slug, EmitterOptions, WorkflowEmitter, AUTOFIX_JOB, MONITOR_JOB};
pub use steps::{plain_text, shell_escape, step_title, ScriptBuilder, StepInput, StepKind, StepRegistry};
