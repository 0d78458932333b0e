//! Checks for known GitHub Actions failure patterns.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

use super::report::ValidationReport;

/// A text pattern that makes a workflow fail.
struct ForbiddenPattern {
    name: &'static str,
    regex: Regex,
    fix: &'static str,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid validator pattern")
}

static FORBIDDEN: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| {
    vec![
        ForbiddenPattern {
            name: "HEREDOC",
            regex: compile(r#"<<\s*['"]?EOF"#),
            fix: "Use echo commands instead of HEREDOC",
        },
        ForbiddenPattern {
            name: "Local uses reference",
            regex: compile(r#"uses:\s*['"]?\./[^'"\s]+"#),
            fix: "Inline the implementation instead of using local references",
        },
        ForbiddenPattern {
            name: "Cat with HEREDOC",
            regex: compile(r"(?m)^\s*cat\s+>.*<<"),
            fix: "Use echo commands for line-by-line generation",
        },
        ForbiddenPattern {
            name: "Multi-line Python",
            regex: compile(r#"python3\s+-c\s+"[^"]*\n[^"]*""#),
            fix: "Use single-line Python commands or script files",
        },
    ]
});

pub(super) static QUOTED_ON: Lazy<Regex> = Lazy::new(|| compile(r#"(?m)^(?:"on"|'on'):"#));

static MATRIX_REF: Lazy<Regex> = Lazy::new(|| compile(r"\$\{\{\s*matrix\."));

static ABSOLUTE_PATH: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?:path|file):\s*['"]?/[^$\s'"][^\s'"]*"#));

const INPUT_TYPES: [&str; 4] = ["string", "choice", "boolean", "environment"];

/// Validates workflow text.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self
    }

    /// Validate a workflow file. An unreadable file is reported as an error.
    pub fn validate_file(&self, path: &Path) -> ValidationReport {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let report = self.validate_str(&content);
                tracing::info!(
                    path = ?path,
                    valid = report.valid,
                    errors = report.errors.len(),
                    warnings = report.warnings.len(),
                    "Workflow validated"
                );
                report
            }
            Err(e) => {
                let mut report = ValidationReport::ok();
                report.add_error(format!("Failed to read file: {e}"));
                report
            }
        }
    }

    /// Validate workflow text.
    pub fn validate_str(&self, content: &str) -> ValidationReport {
        let mut report = ValidationReport::ok();

        let parsed = if content.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_yaml::from_str::<Value>(content)
        };
        let document = match parsed {
            Ok(Value::Null) => {
                report.add_error("YAML file is empty or invalid");
                None
            }
            Ok(value) => Some(value),
            Err(e) => {
                report.add_error(format!("YAML syntax error: {e}"));
                None
            }
        };

        check_forbidden_patterns(content, &mut report);
        check_quoted_on(content, &mut report);
        check_matrix_outputs(content, &mut report);

        if let Some(document) = document {
            match document.as_mapping() {
                Some(root) => {
                    check_structure(root, &mut report);
                    check_triggers(root, &mut report);
                }
                None => report.add_error("Workflow must be a mapping at the top level"),
            }
        }

        check_paths(content, &mut report);
        check_artifacts(content, &mut report);

        report
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

fn check_forbidden_patterns(content: &str, report: &mut ValidationReport) {
    for pattern in FORBIDDEN.iter() {
        for m in pattern.regex.find_iter(content) {
            report.add_error(format!(
                "Forbidden pattern '{}' at line {}: {}",
                pattern.name,
                line_of(content, m.start()),
                pattern.fix
            ));
        }
    }
}

fn check_quoted_on(content: &str, report: &mut ValidationReport) {
    if let Some(m) = QUOTED_ON.find(content) {
        report.add_error(format!(
            "Quoted 'on' key at line {}: GitHub Actions requires an unquoted on:",
            line_of(content, m.start())
        ));
    }
}

fn check_matrix_outputs(content: &str, report: &mut ValidationReport) {
    for line in matrix_output_lines(content) {
        report.add_error(format!(
            "Matrix reference in outputs at line {}: job outputs cannot use ${{{{ matrix.* }}}}",
            line + 1
        ));
    }
}

/// Zero-based indices of lines inside an `outputs:` block that reference
/// `matrix.*`.
pub(super) fn matrix_output_lines(content: &str) -> Vec<usize> {
    let mut lines = Vec::new();
    let mut outputs_indent: Option<usize> = None;

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();

        if let Some(block) = outputs_indent {
            if indent <= block {
                outputs_indent = None;
            } else if MATRIX_REF.is_match(line) {
                lines.push(index);
                continue;
            }
        }

        if let Some(rest) = trimmed.strip_prefix("outputs:") {
            if MATRIX_REF.is_match(rest) {
                lines.push(index);
            } else {
                outputs_indent = Some(indent);
            }
        }
    }

    lines
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

/// The `on` section, also when a YAML 1.1 parser turned the key into `true`.
fn triggers(root: &Mapping) -> Option<&Value> {
    get(root, "on").or_else(|| root.get(Value::Bool(true)))
}

fn check_structure(root: &Mapping, report: &mut ValidationReport) {
    let mut missing = Vec::new();
    if get(root, "name").is_none() {
        missing.push("name");
    }
    if triggers(root).is_none() {
        missing.push("on");
    }
    if get(root, "jobs").is_none() {
        missing.push("jobs");
    }
    if !missing.is_empty() {
        report.add_error(format!("Missing required fields: {}", missing.join(", ")));
    }

    let jobs = match get(root, "jobs").and_then(Value::as_mapping) {
        Some(jobs) if !jobs.is_empty() => jobs,
        _ => {
            if get(root, "jobs").is_some() {
                report.add_error("No jobs defined");
            }
            return;
        }
    };

    let names: Vec<&str> = jobs.keys().filter_map(Value::as_str).collect();

    for (key, config) in jobs {
        let name = key.as_str().unwrap_or("?");
        let Some(job) = config.as_mapping() else {
            report.add_error(format!("Job '{name}' has invalid configuration"));
            continue;
        };

        // reusable workflow calls have no runner or steps
        let calls_workflow = get(job, "uses").is_some();
        if get(job, "runs-on").is_none() && !calls_workflow {
            report.add_error(format!("Job '{name}' missing 'runs-on'"));
        }

        match get(job, "steps") {
            None if !calls_workflow => report.add_warning(format!("Job '{name}' has no steps")),
            Some(Value::Sequence(steps)) if steps.is_empty() => {
                report.add_warning(format!("Job '{name}' has no steps"));
            }
            Some(Value::Sequence(_)) | None => {}
            Some(_) => report.add_error(format!("Job '{name}' steps must be a list")),
        }

        let needs: Vec<&str> = match get(job, "needs") {
            Some(Value::String(single)) => vec![single.as_str()],
            Some(Value::Sequence(list)) => list.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for dependency in needs {
            if !names.contains(&dependency) {
                report.add_error(format!("Job '{name}' needs unknown job '{dependency}'"));
            }
        }
    }
}

fn check_triggers(root: &Mapping, report: &mut ValidationReport) {
    let Some(dispatch) = triggers(root)
        .and_then(Value::as_mapping)
        .and_then(|on| get(on, "workflow_dispatch"))
        .and_then(Value::as_mapping)
    else {
        return;
    };

    let Some(inputs) = get(dispatch, "inputs") else {
        return;
    };
    let Some(inputs) = inputs.as_mapping() else {
        report.add_error("workflow_dispatch inputs must be a dictionary");
        return;
    };

    for (key, config) in inputs {
        let name = key.as_str().unwrap_or("?");
        let Some(config) = config.as_mapping() else {
            report.add_error(format!("Input '{name}' has invalid configuration"));
            continue;
        };

        if let Some(input_type) = get(config, "type") {
            let type_name = input_type.as_str().unwrap_or_default();
            if !INPUT_TYPES.contains(&type_name) {
                report.add_warning(format!(
                    "Input '{name}' has invalid type: {}",
                    serde_yaml::to_string(input_type).unwrap_or_default().trim()
                ));
            }
            if type_name == "choice" && get(config, "options").is_none() {
                report.add_error(format!("Choice input '{name}' missing 'options'"));
            }
        }
    }
}

fn check_paths(content: &str, report: &mut ValidationReport) {
    for m in ABSOLUTE_PATH.find_iter(content) {
        report.add_warning(format!(
            "Absolute path detected at line {}: Use relative or variable paths",
            line_of(content, m.start())
        ));
    }

    let uses_project_dir = content.contains("$PROJECT_DIR") || content.contains("${PROJECT_DIR}");
    if uses_project_dir && !content.contains("PROJECT_DIR=") {
        report.add_warning("PROJECT_DIR used but not defined");
    }
}

fn check_artifacts(content: &str, report: &mut ValidationReport) {
    let uploads = content.matches("actions/upload-artifact@").count();
    let downloads = content.matches("actions/download-artifact@").count();

    if uploads > 0 && downloads == 0 {
        report.add_warning("Artifacts uploaded but never downloaded - possible data sharing issue");
    }
    if downloads > 0 && content.contains("merge-multiple: true") {
        report.add_warning("Using merge-multiple may cause file conflicts");
    }
}
