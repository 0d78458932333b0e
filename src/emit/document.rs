//! GitHub Actions workflow document.
//!
//! Only the subset of the workflow schema the emitter produces is modelled.
//! Maps keep insertion order so jobs and env entries are written in the order
//! they were added.

use indexmap::IndexMap;
use serde::Serialize;

/// A string-keyed map that serializes in insertion order.
pub type OrderedMap<V> = IndexMap<String, V>;

/// A complete workflow file.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDocument {
    /// Workflow name
    pub name: String,

    /// Triggers
    pub on: Triggers,

    /// Token permissions
    pub permissions: OrderedMap<String>,

    /// Workflow-level environment
    pub env: OrderedMap<String>,

    /// Jobs in emission order
    pub jobs: OrderedMap<Job>,
}

/// Workflow triggers.
#[derive(Debug, Clone, Serialize)]
pub struct Triggers {
    /// Manual dispatch
    pub workflow_dispatch: Dispatch,

    /// Issue events
    pub issues: IssueTrigger,
}

/// Manual dispatch trigger.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatch {
    /// Dispatch inputs
    pub inputs: OrderedMap<DispatchInput>,
}

/// One workflow_dispatch input.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchInput {
    /// Shown in the dispatch form
    pub description: String,

    /// Whether a value is required
    pub required: bool,

    /// Input type (`string`, `choice`, `boolean`, `environment`)
    #[serde(rename = "type")]
    pub input_type: String,

    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Issue event trigger.
#[derive(Debug, Clone, Serialize)]
pub struct IssueTrigger {
    /// Activity types
    pub types: Vec<String>,
}

/// One job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Job {
    /// Runner label
    #[serde(rename = "runs-on")]
    pub runs_on: String,

    /// Timeout in minutes
    #[serde(rename = "timeout-minutes", skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,

    /// Jobs that must finish first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Run condition
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Job environment
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: OrderedMap<String>,

    /// Steps in order
    pub steps: Vec<Step>,
}

/// One step of a job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Step {
    /// Display name
    pub name: String,

    /// Action reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Run condition
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Action inputs
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub with: OrderedMap<serde_yaml::Value>,

    /// Shell script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

impl Step {
    /// A step running an action.
    pub fn action(name: impl Into<String>, uses: impl Into<String>) -> Self {
        Self { name: name.into(), uses: Some(uses.into()), ..Self::default() }
    }

    /// A step running shell lines.
    pub fn script(name: impl Into<String>, lines: &[String]) -> Self {
        Self { name: name.into(), run: Some(lines.join("\n")), ..Self::default() }
    }

    /// Set the run condition.
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Add an action input.
    pub fn with_input(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.with.insert(key.to_string(), value.into());
        self
    }
}

impl WorkflowDocument {
    /// Names of the jobs that need `job`.
    pub fn dependents_of<'a>(&'a self, job: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.jobs
            .iter()
            .filter(move |(_, spec)| spec.needs.iter().any(|n| n == job))
            .map(|(name, _)| name.as_str())
    }

    /// Total number of steps over all jobs.
    pub fn step_count(&self) -> usize {
        self.jobs.iter().map(|(_, job)| job.steps.len()).sum()
    }
}
