//! Task template files.
//!
//! A template is a YAML file describing the tasks of one domain:
//!
//! ```yaml
//! name: news-video
//! tasks:
//!   - name: Generate key visual
//!     stage: 1
//!     parallel: true
//!     duration_minutes: 8
//!     complexity: 2
//!     jobs:
//!       - Generate a 16:9 image with t2i-fal-imagen4-ultra
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::{FlowError, FlowResult};

/// A template file as written by its author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateFile {
    /// Display name of the template
    #[serde(default)]
    pub name: Option<String>,

    /// What the template produces
    #[serde(default)]
    pub description: Option<String>,

    /// Declared tasks, in author order
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
}

/// One task declared in a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Name of the task
    #[serde(default = "default_task_name")]
    pub name: String,

    /// Author-assigned execution stage
    #[serde(default)]
    pub stage: u32,

    /// Free-text job descriptions
    #[serde(default)]
    pub jobs: Vec<String>,

    /// References to tasks this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Whether the task may run alongside its stage siblings
    #[serde(default)]
    pub parallel: bool,

    /// Estimated duration in minutes
    #[serde(default = "default_duration", alias = "duration_estimate")]
    pub duration_minutes: u32,

    /// Relative cost of the task
    #[serde(default = "default_complexity")]
    pub complexity: u32,
}

fn default_task_name() -> String {
    "Unknown Task".to_string()
}

const fn default_duration() -> u32 {
    5
}

const fn default_complexity() -> u32 {
    1
}

/// A parsed template together with the text it was parsed from.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    /// Template name (the file stem)
    pub name: String,

    /// Source file
    pub path: PathBuf,

    /// Raw file content, scanned for service references
    pub raw: String,

    /// Parsed content
    pub file: TemplateFile,
}

/// A template file that could not be loaded.
#[derive(Debug, Clone)]
pub struct SkippedTemplate {
    /// Source file
    pub path: PathBuf,

    /// Why it was skipped
    pub reason: String,
}

/// All templates found in a directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    templates: Vec<LoadedTemplate>,
    skipped: Vec<SkippedTemplate>,
}

impl LoadedTemplate {
    /// Parse a template from its text.
    pub fn parse(name: impl Into<String>, path: impl Into<PathBuf>, raw: String) -> FlowResult<Self> {
        let path = path.into();
        let file: TemplateFile = if raw.trim().is_empty() {
            TemplateFile::default()
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|source| FlowError::TemplateParse { path: path.clone(), source })?
        };
        Ok(Self { name: name.into(), path, raw, file })
    }

    /// Read and parse a template file.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| FlowError::Read { path: path.to_path_buf(), source })?;
        let name = path.file_stem().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
        Self::parse(name, path, raw)
    }

    /// Declared tasks.
    pub fn tasks(&self) -> &[TaskTemplate] {
        &self.file.tasks
    }
}

impl TemplateIndex {
    /// Load every `*.yml` / `*.yaml` file directly inside `dir`.
    ///
    /// Files are visited in file-name order. A file that cannot be read or
    /// parsed is skipped with a warning.
    pub fn load(dir: &Path) -> FlowResult<Self> {
        if !dir.is_dir() {
            return Err(FlowError::TemplateDirNotFound(dir.to_path_buf()));
        }

        let mut index = Self::default();

        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_template_file(e.path()));

        for entry in entries {
            let path = entry.path();
            match LoadedTemplate::load(path) {
                Ok(template) => {
                    tracing::debug!(
                        template = template.name,
                        tasks = template.tasks().len(),
                        "Loaded template"
                    );
                    index.push(template);
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping template");
                    index.skipped.push(SkippedTemplate {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            dir = ?dir,
            templates = index.templates.len(),
            skipped = index.skipped.len(),
            "Template directory loaded"
        );

        Ok(index)
    }

    /// Build an index from already parsed templates.
    pub fn from_templates(templates: Vec<LoadedTemplate>) -> Self {
        let mut index = Self::default();
        for template in templates {
            index.push(template);
        }
        index
    }

    /// Add a template, renaming it when its name is already taken.
    ///
    /// `news.yml` next to `news.yaml` becomes `news_yml`; further clashes get
    /// a numeric suffix. Node ids embed the template name, so names must be
    /// unique within an index.
    fn push(&mut self, mut template: LoadedTemplate) {
        if self.contains_name(&template.name) {
            let base = match template.path.extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{}_{}", template.name, ext),
                None => template.name.clone(),
            };
            let mut name = base.clone();
            let mut n = 2;
            while self.contains_name(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            tracing::warn!(
                path = ?template.path,
                from = template.name,
                to = name,
                "Template name already taken, renaming"
            );
            template.name = name;
        }
        self.templates.push(template);
    }

    fn contains_name(&self, name: &str) -> bool {
        self.templates.iter().any(|t| t.name == name)
    }

    /// Successfully loaded templates.
    pub fn templates(&self) -> &[LoadedTemplate] {
        &self.templates
    }

    /// Files that failed to load.
    pub fn skipped(&self) -> &[SkippedTemplate] {
        &self.skipped
    }

    /// Every task of every template, flattened in load order.
    pub fn records(&self) -> impl Iterator<Item = (&LoadedTemplate, &TaskTemplate)> {
        self.templates.iter().flat_map(|t| t.tasks().iter().map(move |task| (t, task)))
    }

    /// Total number of declared tasks.
    pub fn task_count(&self) -> usize {
        self.templates.iter().map(|t| t.tasks().len()).sum()
    }
}

fn is_template_file(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "yml" || e == "yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_defaults() {
        let yaml = r"
tasks:
  - jobs: [do something]
";
        let template = LoadedTemplate::parse("t", "t.yml", yaml.to_string()).unwrap();
        let task = &template.tasks()[0];
        assert_eq!(task.name, "Unknown Task");
        assert_eq!(task.stage, 0);
        assert_eq!(task.duration_minutes, 5);
        assert_eq!(task.complexity, 1);
        assert!(!task.parallel);
        assert!(task.depends_on.is_empty());
    }

    #[test]
    fn test_duration_estimate_alias() {
        let yaml = r"
tasks:
  - name: Render
    stage: 2
    duration_estimate: 12
";
        let template = LoadedTemplate::parse("t", "t.yml", yaml.to_string()).unwrap();
        assert_eq!(template.tasks()[0].duration_minutes, 12);
    }

    #[test]
    fn test_template_without_tasks_is_empty() {
        let template =
            LoadedTemplate::parse("t", "t.yml", "name: nothing here\n".to_string()).unwrap();
        assert!(template.tasks().is_empty());

        let empty = LoadedTemplate::parse("e", "e.yml", String::new()).unwrap();
        assert!(empty.tasks().is_empty());
    }

    #[test]
    fn test_parse_error_reports_path() {
        let err = LoadedTemplate::parse("bad", "bad.yml", "tasks: [\n".to_string()).unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn test_same_stem_templates_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("news.yml"), "tasks:\n  - name: Draw\n    stage: 1\n")
            .unwrap();
        std::fs::write(dir.path().join("news.yaml"), "tasks:\n  - name: Draw\n    stage: 1\n")
            .unwrap();

        let index = TemplateIndex::load(dir.path()).unwrap();

        let names: Vec<_> = index.templates().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["news", "news_yml"]);
    }

    #[test]
    fn test_load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b-video.yml"),
            "tasks:\n  - name: Make clip\n    stage: 2\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a-image.yaml"),
            "tasks:\n  - name: Draw\n    stage: 1\n  - name: Check\n    stage: 2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yml"), "tasks: [\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# not a template").unwrap();

        let index = TemplateIndex::load(dir.path()).unwrap();

        let names: Vec<_> = index.templates().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a-image", "b-video"]);
        assert_eq!(index.skipped().len(), 1);
        assert!(index.skipped()[0].path.ends_with("broken.yml"));
        assert_eq!(index.task_count(), 3);
        assert_eq!(index.records().count(), 3);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(TemplateIndex::load(&missing), Err(FlowError::TemplateDirNotFound(_))));
    }
}
