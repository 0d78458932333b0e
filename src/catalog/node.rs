//! Task nodes: executable units extracted from templates.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::template::TaskTemplate;

/// One task of one template, annotated with capabilities and services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Stable node id
    pub id: String,

    /// Template the task was declared in
    pub source_template: String,

    /// Author-assigned execution stage
    pub stage: u32,

    /// Task name
    pub name: String,

    /// Whether the task may run alongside its stage siblings
    pub parallel: bool,

    /// Free-text job descriptions
    pub jobs: Vec<String>,

    /// Capability tags
    pub capabilities: BTreeSet<String>,

    /// MCP services referenced by the source template
    pub mcp_services: BTreeSet<String>,

    /// Declared dependencies, unvalidated
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Estimated duration in minutes
    pub duration_estimate: u32,

    /// Relative cost
    pub complexity: u32,
}

impl TaskNode {
    /// Build a node from a declared task.
    pub fn from_template(
        id: String,
        source_template: &str,
        task: &TaskTemplate,
        capabilities: BTreeSet<String>,
        mcp_services: BTreeSet<String>,
    ) -> Self {
        Self {
            id,
            source_template: source_template.to_string(),
            stage: task.stage,
            name: task.name.clone(),
            parallel: task.parallel,
            jobs: task.jobs.clone(),
            capabilities,
            mcp_services,
            dependencies: task.depends_on.clone(),
            duration_estimate: task.duration_minutes,
            complexity: task.complexity,
        }
    }

    /// Whether the node carries a capability tag.
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// Sort key used when the cheapest nodes are preferred.
    pub fn cost_key(&self) -> (u32, u32, &str) {
        (self.complexity, self.duration_estimate, self.id.as_str())
    }

    /// Sort key of the final plan order.
    pub fn priority_key(&self) -> (u32, u32, u32, &str) {
        (self.stage, self.complexity, self.duration_estimate, self.id.as_str())
    }
}

/// Derives node ids from template content.
///
/// An id is `{template}_{stage}_{hash}` where `hash` is the first eight hex
/// digits of the SHA-256 of the task name. Repeats of the same
/// (stage, name) pair within one template get `_2`, `_3`, ... in file order,
/// so ids do not depend on the order templates are visited in.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    seen: HashMap<String, usize>,
}

impl NodeIdAllocator {
    /// Create an allocator for one template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id of the next task of `template`.
    pub fn allocate(&mut self, template: &str, task: &TaskTemplate) -> String {
        let base = format!("{}_{}_{}", template, task.stage, name_digest(&task.name));
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}_{count}")
        }
    }
}

fn name_digest(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
