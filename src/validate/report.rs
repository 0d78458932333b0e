//! Validation results.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{FlowError, FlowResult};

/// Outcome of validating one workflow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether no errors were found
    pub valid: bool,

    /// Problems that will make the workflow fail
    pub errors: Vec<String>,

    /// Problems that may cause trouble at runtime
    pub warnings: Vec<String>,

    /// Repairs applied before validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixes_applied: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationReport {
    /// A report without issues.
    pub fn ok() -> Self {
        Self { valid: true, errors: Vec::new(), warnings: Vec::new(), fixes_applied: Vec::new() }
    }

    /// Record an error.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.valid = false;
        self.errors.push(error.into());
    }

    /// Record a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.fixes_applied.extend(other.fixes_applied);
    }

    /// Whether any error or warning was recorded.
    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> FlowResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|source| FlowError::Write { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_invalidate() {
        let mut report = ValidationReport::ok();
        report.add_warning("careful");
        assert!(report.valid);
        assert!(report.has_issues());

        report.add_error("broken");
        assert!(!report.valid);
    }

    #[test]
    fn test_merge() {
        let mut first = ValidationReport::ok();
        let mut second = ValidationReport::ok();
        second.add_error("bad");
        second.add_warning("meh");

        first.merge(second);
        assert!(!first.valid);
        assert_eq!(first.errors, vec!["bad"]);
        assert_eq!(first.warnings, vec!["meh"]);
    }

    #[test]
    fn test_json_shape() {
        let mut report = ValidationReport::ok();
        report.add_warning("w");
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["valid"], true);
        assert_eq!(json["errors"].as_array().unwrap().len(), 0);
        assert_eq!(json["warnings"][0], "w");
        assert!(json.get("fixes_applied").is_none());
    }
}
