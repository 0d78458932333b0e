//! Workflow emission.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::{
    Dispatch, DispatchInput, IssueTrigger, Job, OrderedMap, Step, Triggers, WorkflowDocument,
};
use super::steps::{plain_text, shell_escape, StepRegistry};
use crate::catalog::{NodeDatabase, TaskNode};
use crate::core::{FlowError, FlowResult};
use crate::plan::ExecutionStage;

static QUOTED_ON_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^(?:'on'|"on"):"#).expect("valid on-key pattern"));

/// Job name of the trailer that runs when any stage fails.
pub const AUTOFIX_JOB: &str = "autofix_integration";

/// Job name of the trailer that always runs.
pub const MONITOR_JOB: &str = "monitor_integration";

/// Settings of the generated jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterOptions {
    /// Runner label
    pub runner: String,

    /// CLI tool invoked by generated steps
    pub cli_tool: String,

    /// Retention of uploaded artifacts, in days
    pub artifact_retention_days: u32,

    /// Minutes added to a single node's estimate
    pub job_timeout_buffer: u32,

    /// Minutes added to the summed estimate of a combined job
    pub combined_timeout_buffer: u32,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            runner: "ubuntu-latest".to_string(),
            cli_tool: "claude-code".to_string(),
            artifact_retention_days: 7,
            job_timeout_buffer: 5,
            combined_timeout_buffer: 10,
        }
    }
}

/// Turns execution stages into a workflow document.
#[derive(Debug, Clone)]
pub struct WorkflowEmitter<'a> {
    db: &'a NodeDatabase,
    options: EmitterOptions,
    registry: StepRegistry,
    generated_at: Option<String>,
}

impl<'a> WorkflowEmitter<'a> {
    /// Create an emitter with default options and step kinds.
    pub fn new(db: &'a NodeDatabase) -> Self {
        Self {
            db,
            options: EmitterOptions::default(),
            registry: StepRegistry::default(),
            generated_at: None,
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: EmitterOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the step registry.
    pub fn with_registry(mut self, registry: StepRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Fix the `GENERATED_AT` value instead of using the current time.
    pub fn with_generated_at(mut self, timestamp: impl Into<String>) -> Self {
        self.generated_at = Some(timestamp.into());
        self
    }

    /// Build the workflow document for `stages`.
    ///
    /// Stage `n` (1-based) becomes either one job per node, when every node
    /// is parallel, or a single combined job. Every job of stage `n` needs
    /// every job of stage `n - 1`.
    pub fn emit(
        &self,
        name: &str,
        requirements: &[String],
        stages: &[ExecutionStage],
    ) -> FlowResult<WorkflowDocument> {
        let joined = plain_text(&requirements.join(" | "));
        let mut jobs: OrderedMap<Job> = OrderedMap::new();
        let mut previous: Vec<String> = Vec::new();
        let mut all_stage_jobs: Vec<String> = Vec::new();

        for (index, stage) in stages.iter().filter(|s| !s.node_ids.is_empty()).enumerate() {
            let number = index + 1;
            let nodes = stage
                .node_ids
                .iter()
                .map(|id| self.db.get(id).ok_or_else(|| FlowError::UnknownNode(id.clone())))
                .collect::<FlowResult<Vec<&TaskNode>>>()?;

            let mut current = Vec::new();
            // Any all-parallel stage, even a single node, emits per-node jobs.
            if nodes.iter().all(|n| n.parallel) {
                for (k, node) in nodes.iter().enumerate() {
                    let job_name = format!("stage_{number}_parallel_{}", k + 1);
                    let mut job = self.node_job(node, number);
                    job.needs = previous.clone();
                    jobs.insert(job_name.clone(), job);
                    current.push(job_name);
                }
            } else {
                let job_name = format!("stage_{number}");
                let mut job = self.combined_job(&nodes, number);
                job.needs = previous.clone();
                jobs.insert(job_name.clone(), job);
                current.push(job_name);
            }

            tracing::debug!(stage = number, nodes = nodes.len(), jobs = ?current, "Emitted stage");
            all_stage_jobs.extend(current.iter().cloned());
            previous = current;
        }

        jobs.insert(AUTOFIX_JOB.to_string(), self.autofix_job(&all_stage_jobs));
        jobs.insert(MONITOR_JOB.to_string(), self.monitor_job(&all_stage_jobs));

        let generated_at = self
            .generated_at
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());

        let inputs: OrderedMap<DispatchInput> = [(
            "user_prompt".to_string(),
            DispatchInput {
                description: "User requirements for multimedia generation".to_string(),
                required: true,
                input_type: "string".to_string(),
                default: Some(joined.clone()),
            },
        )]
        .into_iter()
        .collect();

        let permissions: OrderedMap<String> = ["contents", "actions", "issues", "pull-requests"]
            .into_iter()
            .map(|scope| (scope.to_string(), "write".to_string()))
            .collect();

        let env: OrderedMap<String> = [
            ("WORKFLOW_TYPE", "dynamic-multimedia".to_string()),
            ("GENERATED_AT", generated_at),
            ("REQUIREMENTS", joined),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        tracing::info!(
            workflow = name,
            stages = stage_count(stages),
            jobs = jobs.len(),
            "Workflow emitted"
        );

        Ok(WorkflowDocument {
            name: plain_text(name),
            on: Triggers {
                workflow_dispatch: Dispatch { inputs },
                issues: IssueTrigger { types: vec!["opened".to_string(), "edited".to_string()] },
            },
            permissions,
            env,
            jobs,
        })
    }

    fn node_job(&self, node: &TaskNode, stage: usize) -> Job {
        let env: OrderedMap<String> = [
            ("TASK_NODE_ID", node.id.clone()),
            ("TASK_NAME", plain_text(&node.name)),
            ("STAGE", stage.to_string()),
            ("SOURCE_TEMPLATE", node.source_template.clone()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        let mut steps = vec![
            checkout(),
            Step::script(
                "Set up task environment",
                &[
                    format!("echo \"Setting up environment for {}\"", node.id),
                    "mkdir -p .logs outputs artifacts".to_string(),
                    "echo \"TASK_START_TIME=$(date -u +%Y-%m-%dT%H:%M:%SZ)\" >> $GITHUB_ENV"
                        .to_string(),
                ],
            ),
        ];
        steps.extend(self.registry.steps_for(node, &self.options.cli_tool));
        steps.push(self.upload("Upload task results", &format!("task-results-{}", node.id)));

        Job {
            runs_on: self.options.runner.clone(),
            timeout_minutes: Some(node.duration_estimate + self.options.job_timeout_buffer),
            env,
            steps,
            ..Job::default()
        }
    }

    fn combined_job(&self, nodes: &[&TaskNode], stage: usize) -> Job {
        let total: u32 = nodes.iter().map(|n| n.duration_estimate).sum();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let env: OrderedMap<String> = [
            ("STAGE", stage.to_string()),
            ("TASK_NODE_IDS", ids.join(",")),
            ("TASK_COUNT", nodes.len().to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        let mut steps = vec![
            checkout(),
            Step::script(
                "Set up stage environment",
                &[
                    format!("echo \"Setting up stage {stage} with {} tasks\"", nodes.len()),
                    "mkdir -p .logs outputs artifacts".to_string(),
                    "echo \"STAGE_START_TIME=$(date -u +%Y-%m-%dT%H:%M:%SZ)\" >> $GITHUB_ENV"
                        .to_string(),
                ],
            ),
        ];

        for node in nodes {
            steps.push(Step::script(
                format!("Execute: {}", plain_text(&node.name)),
                &[
                    format!("echo \"Starting task: {}\"", shell_escape(&node.name)),
                    format!("echo \"CURRENT_TASK={}\" >> $GITHUB_ENV", node.id),
                ],
            ));
            steps.extend(self.registry.steps_for(node, &self.options.cli_tool));
        }
        steps.push(self.upload("Upload stage results", &format!("stage-{stage}-results")));

        Job {
            runs_on: self.options.runner.clone(),
            timeout_minutes: Some(total + self.options.combined_timeout_buffer),
            env,
            steps,
            ..Job::default()
        }
    }

    fn upload(&self, name: &str, artifact: &str) -> Step {
        Step::action(name, "actions/upload-artifact@v4")
            .when("always()")
            .with_input("name", artifact)
            .with_input("path", "outputs/")
            .with_input("retention-days", self.options.artifact_retention_days)
    }

    fn autofix_job(&self, needs: &[String]) -> Job {
        Job {
            runs_on: self.options.runner.clone(),
            needs: needs.to_vec(),
            condition: Some("failure()".to_string()),
            steps: vec![Step::script(
                "Trigger AutoFix",
                &[
                    "echo \"Triggering AutoFix system...\"".to_string(),
                    "echo \"AUTOFIX_TRIGGERED=true\" >> $GITHUB_ENV".to_string(),
                ],
            )],
            ..Job::default()
        }
    }

    fn monitor_job(&self, needs: &[String]) -> Job {
        Job {
            runs_on: self.options.runner.clone(),
            needs: needs.to_vec(),
            condition: Some("always()".to_string()),
            steps: vec![Step::script(
                "Report to Monitor",
                &[
                    "echo \"Reporting to Monitor system...\"".to_string(),
                    "echo \"MONITOR_REPORTED=true\" >> $GITHUB_ENV".to_string(),
                ],
            )],
            ..Job::default()
        }
    }

    /// Serialize a document to YAML with an unquoted `on` key.
    pub fn to_yaml(document: &WorkflowDocument) -> FlowResult<String> {
        let yaml = serde_yaml::to_string(document)?;
        Ok(QUOTED_ON_KEY.replace_all(&yaml, "on:").into_owned())
    }

    /// Write a document to `{dir}/{slug(name)}.yml`.
    pub fn write(document: &WorkflowDocument, dir: &Path) -> FlowResult<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(|source| FlowError::Write { path: dir.to_path_buf(), source })?;

        let path = dir.join(format!("{}.yml", slug(&document.name)));
        let yaml = Self::to_yaml(document)?;
        std::fs::write(&path, yaml)
            .map_err(|source| FlowError::Write { path: path.clone(), source })?;

        tracing::info!(path = ?path, "Workflow written");
        Ok(path)
    }
}

fn stage_count(stages: &[ExecutionStage]) -> usize {
    stages.iter().filter(|s| !s.node_ids.is_empty()).count()
}

fn checkout() -> Step {
    Step::action("Checkout repository", "actions/checkout@v4")
}

/// File-name-safe form of a workflow name.
pub fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "workflow".to_string()
    } else {
        slug
    }
}
