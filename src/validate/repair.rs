//! Automatic repair of known workflow failure patterns.
//!
//! Repairs are textual so comments and layout of the rest of the file are
//! kept. A repaired file is written back after the original is saved next to
//! it with a `.backup` suffix.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::validator::{matrix_output_lines, QUOTED_ON};
use crate::core::{FlowError, FlowResult};

static HEREDOC_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\s*)cat\s*>\s*(\S+)\s*<<-?\s*['"]?(\w+)['"]?\s*$"#)
        .expect("valid heredoc pattern")
});

static LOCAL_USES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\s*)(-\s+)?uses:\s*['"]?(\./[^'"\s]+)['"]?\s*$"#)
        .expect("valid local uses pattern")
});

/// Text after repair and what was changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repair {
    /// Repaired text
    pub content: String,

    /// Human-readable list of applied fixes
    pub fixes: Vec<String>,
}

impl Repair {
    /// Whether anything was changed.
    pub fn changed(&self) -> bool {
        !self.fixes.is_empty()
    }
}

/// Repair workflow text.
pub fn repair(content: &str) -> Repair {
    let mut fixes = Vec::new();
    let mut text = content.to_string();

    if QUOTED_ON.is_match(&text) {
        text = QUOTED_ON.replace_all(&text, "on:").into_owned();
        fixes.push("Fixed quoted 'on' field".to_string());
    }

    let matrix_lines: HashSet<usize> = matrix_output_lines(&text).into_iter().collect();
    if !matrix_lines.is_empty() {
        text = rejoin(
            &text,
            text.lines()
                .enumerate()
                .filter(|(index, _)| !matrix_lines.contains(index))
                .map(|(_, line)| line.to_string())
                .collect(),
        );
        fixes.push("Removed invalid matrix references in outputs".to_string());
    }

    let (converted, count) = convert_heredocs(&text);
    if count > 0 {
        text = converted;
        fixes.push("Converted HEREDOC to echo commands".to_string());
    }

    let (disabled, paths) = disable_local_uses(&text);
    if !paths.is_empty() {
        text = disabled;
        fixes.extend(paths.into_iter().map(|p| format!("Disabled local uses: {p}")));
    }

    Repair { content: text, fixes }
}

/// Repair a workflow file in place.
///
/// Returns the repair and, when the file changed, the backup path.
pub fn repair_file(path: &Path) -> FlowResult<(Repair, Option<PathBuf>)> {
    let original = std::fs::read_to_string(path)
        .map_err(|source| FlowError::Read { path: path.to_path_buf(), source })?;

    let repair = repair(&original);
    if !repair.changed() {
        return Ok((repair, None));
    }

    let backup = backup_path(path);
    std::fs::write(&backup, &original)
        .map_err(|source| FlowError::Write { path: backup.clone(), source })?;
    std::fs::write(path, &repair.content)
        .map_err(|source| FlowError::Write { path: path.to_path_buf(), source })?;

    tracing::info!(path = ?path, backup = ?backup, fixes = repair.fixes.len(), "Workflow repaired");
    Ok((repair, Some(backup)))
}

/// `workflow.yml` -> `workflow.yml.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

fn rejoin(original: &str, lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    if original.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn echo_escape(line: &str) -> String {
    line.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$").replace('`', "\\`")
}

/// Replace `cat > file << EOF ... EOF` blocks with `echo` lines.
fn convert_heredocs(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut converted = 0;
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = HEREDOC_START.captures(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };

        let indent = &caps[1];
        let target = &caps[2];
        let delimiter = &caps[3];
        let end = lines[i + 1..].iter().position(|l| l.trim() == delimiter).map(|p| i + 1 + p);

        let Some(end) = end else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };

        let body = &lines[i + 1..end];
        if body.is_empty() {
            out.push(format!("{indent}: > {target}"));
        }
        for (n, line) in body.iter().enumerate() {
            let content = line.strip_prefix(indent).unwrap_or_else(|| line.trim_start());
            let redirect = if n == 0 { ">" } else { ">>" };
            out.push(format!("{indent}echo \"{}\" {redirect} {target}", echo_escape(content)));
        }

        converted += 1;
        i = end + 1;
    }

    (rejoin(text, out), converted)
}

/// Replace local `uses: ./...` steps with a placeholder `run`.
fn disable_local_uses(text: &str) -> (String, Vec<String>) {
    let mut out = Vec::new();
    let mut paths = Vec::new();

    for line in text.lines() {
        let Some(caps) = LOCAL_USES.captures(line) else {
            out.push(line.to_string());
            continue;
        };

        let indent = &caps[1];
        let item = caps.get(2).map_or("", |m| m.as_str());
        let local = &caps[3];
        out.push(format!("{indent}# Disabled: local uses are not supported"));
        out.push(format!("{indent}# Inline the implementation from {local}"));
        out.push(format!("{indent}{item}run: echo \"Placeholder for {local}\""));
        paths.push(local.to_string());
    }

    (rejoin(text, out), paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::WorkflowValidator;

    const BROKEN: &str = r#""on":
  workflow_dispatch:
name: broken
jobs:
  build:
    runs-on: ubuntu-latest
    outputs:
      file: ${{ matrix.name }}
      count: ${{ steps.count.outputs.value }}
    steps:
      - uses: ./.github/actions/setup
      - name: Write notes
        run: |
          cat > notes.txt << 'EOF'
          Price: $5 "each"
            indented
          EOF
          cat notes.txt
"#;

    #[test]
    fn test_repair_fixes_everything() {
        let repair = repair(BROKEN);

        assert_eq!(
            repair.fixes,
            vec![
                "Fixed quoted 'on' field",
                "Removed invalid matrix references in outputs",
                "Converted HEREDOC to echo commands",
                "Disabled local uses: ./.github/actions/setup",
            ]
        );

        let text = &repair.content;
        assert!(text.starts_with("on:\n"));
        assert!(!text.contains("matrix."));
        assert!(text.contains("count: ${{ steps.count.outputs.value }}"));
        assert!(text.contains(r#"          echo "Price: \$5 \"each\"" > notes.txt"#));
        assert!(text.contains(r#"          echo "  indented" >> notes.txt"#));
        assert!(text.contains("          cat notes.txt"));
        assert!(text.contains(r#"      - run: echo "Placeholder for ./.github/actions/setup""#));

        let report = WorkflowValidator::new().validate_str(text);
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_clean_text_is_untouched() {
        let clean = "name: ok\non: push\njobs: {}\n";
        let repair = repair(clean);
        assert!(!repair.changed());
        assert_eq!(repair.content, clean);
    }

    #[test]
    fn test_unterminated_heredoc_is_left_alone() {
        let text = "run: |\n  cat > a.txt << EOF\n  never closed\n";
        let (converted, count) = convert_heredocs(text);
        assert_eq!(count, 0);
        assert_eq!(converted, text);
    }

    #[test]
    fn test_repair_file_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yml");
        std::fs::write(&path, BROKEN).unwrap();

        let (repair, backup) = repair_file(&path).unwrap();
        let backup = backup.unwrap();

        assert!(backup.ends_with("flow.yml.backup"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), BROKEN);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), repair.content);
    }

    #[test]
    fn test_repair_file_without_changes_has_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yml");
        std::fs::write(&path, "name: ok\n").unwrap();

        let (_, backup) = repair_file(&path).unwrap();
        assert!(backup.is_none());
        assert!(!dir.path().join("flow.yml.backup").exists());
    }
}
