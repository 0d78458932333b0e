//! # Mediaflow
//!
//! Turn free-text multimedia requirements into GitHub Actions workflows.
//!
//! Mediaflow reads a directory of YAML task templates, tags every task with
//! the capabilities it provides, and keeps the result in a node database.
//! Requirements are matched against that database, the selected tasks are
//! grouped into execution stages, and the stages are rendered as a workflow
//! whose jobs are chained through `needs`.
//!
//! ## Pipeline
//!
//! - **catalog**: template loading, capability tagging, the node database
//! - **plan**: requirement resolution and stage scheduling
//! - **emit**: workflow document generation
//! - **validate**: post-checks and automatic repair of workflow files
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the node database from meta/examples
//! mediaflow extract
//!
//! # Generate a workflow
//! mediaflow assemble -r "画像生成" -r "動画作成"
//!
//! # Check a workflow file
//! mediaflow validate generated/workflows/staging/dynamic-multimedia-workflow.yml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::use_self)]

pub mod catalog;
pub mod core;
pub mod emit;
pub mod plan;
pub mod validate;

// Re-export commonly used types
pub use catalog::{KeywordTable, NodeDatabase, TaskNode, TemplateIndex};
pub use core::{Config, FlowError, FlowResult};
pub use emit::{WorkflowDocument, WorkflowEmitter};
pub use plan::{EnhancedContext, RequirementResolver, Resolution, ScheduleOrder, StageScheduler};
pub use validate::{ValidationReport, WorkflowValidator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "mediaflow";
