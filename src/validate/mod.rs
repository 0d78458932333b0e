//! Post-checks for generated (or hand-written) GitHub Actions workflows.
//!
//! The validator runs independently of the emitter: it takes workflow text,
//! reports `{valid, errors, warnings}` and can repair the patterns it knows
//! how to fix.

mod repair;
mod report;
mod validator;

pub use repair::{backup_path, repair, repair_file, Repair};
pub use report::ValidationReport;
pub use validator::WorkflowValidator;
