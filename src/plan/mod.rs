//! Execution planning.
//!
//! Requirements are resolved to task nodes, and the selected nodes are then
//! grouped into ordered execution stages.

mod resolver;
mod scheduler;

pub use resolver::{
    EnhancedContext, MatchKind, RequirementMatch, RequirementResolver, Resolution, ResolverPolicy,
};
pub use scheduler::{ExecutionStage, ScheduleOrder, StageScheduler};
