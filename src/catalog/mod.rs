//! Task templates, capability tagging and the node database.
//!
//! This module turns a directory of template files into a [`NodeDatabase`]:
//! every declared task becomes a [`TaskNode`] tagged with capabilities from
//! the shared [`KeywordTable`].

mod capability;
mod database;
mod keywords;
mod node;
mod services;
mod template;

pub use capability::CapabilityExtractor;
pub use database::{ExtractionMetadata, NodeDatabase};
pub use keywords::{
    AssumptionRule, CapabilityKeywords, KeywordTable, RequirementKeyword, GENERAL_CAPABILITY,
};
pub use node::{NodeIdAllocator, TaskNode};
pub use services::ServiceScanner;
pub use template::{LoadedTemplate, SkippedTemplate, TaskTemplate, TemplateFile, TemplateIndex};
