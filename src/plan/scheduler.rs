//! Grouping of selected nodes into execution stages.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{NodeDatabase, TaskNode};
use crate::core::{FlowError, FlowResult};

/// How selected nodes are ordered into stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleOrder {
    /// Group by the author-assigned `stage` field
    #[default]
    Stage,
    /// Layer by declared `depends_on` edges
    Dependencies,
}

impl ScheduleOrder {
    /// Accepted names.
    pub const NAMES: [&'static str; 2] = ["stage", "dependencies"];

    /// Name used in config files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Dependencies => "dependencies",
        }
    }
}

impl fmt::Display for ScheduleOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleOrder {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stage" => Ok(Self::Stage),
            "dependencies" | "deps" => Ok(Self::Dependencies),
            other => Err(FlowError::Config(format!(
                "unknown schedule order '{other}' (expected stage or dependencies)"
            ))),
        }
    }
}

/// A set of nodes that may start together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStage {
    /// Stage number (the `stage` field, or the dependency layer starting at 1)
    pub stage: u32,

    /// Node ids in this stage
    pub node_ids: Vec<String>,
}

/// Partitions node ids into ordered stages.
#[derive(Debug, Clone, Copy)]
pub struct StageScheduler<'a> {
    db: &'a NodeDatabase,
}

impl<'a> StageScheduler<'a> {
    /// Create a scheduler over a node database.
    pub fn new(db: &'a NodeDatabase) -> Self {
        Self { db }
    }

    /// Schedule `ids` in the given order.
    pub fn schedule(&self, ids: &[String], order: ScheduleOrder) -> FlowResult<Vec<ExecutionStage>> {
        let stages = match order {
            ScheduleOrder::Stage => self.by_stage(ids)?,
            ScheduleOrder::Dependencies => self.by_dependencies(ids)?,
        };
        tracing::debug!(order = %order, stages = stages.len(), "Scheduled nodes");
        Ok(stages)
    }

    /// Group ids by their node's `stage` field, stages ascending.
    ///
    /// Order within a stage follows the input. Declared dependencies are not
    /// consulted.
    pub fn by_stage(&self, ids: &[String]) -> FlowResult<Vec<ExecutionStage>> {
        let mut stages: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for id in ids {
            let node = self.node(id)?;
            stages.entry(node.stage).or_default().push(id.clone());
        }

        Ok(stages
            .into_iter()
            .map(|(stage, node_ids)| ExecutionStage { stage, node_ids })
            .collect())
    }

    /// Layer ids topologically over their `depends_on` edges.
    ///
    /// A reference resolves to a selected node with that id, or to selected
    /// nodes of the same template with that task name. References outside the
    /// selection are ignored. A cycle is reported with the nodes on it.
    pub fn by_dependencies(&self, ids: &[String]) -> FlowResult<Vec<ExecutionStage>> {
        let mut nodes: Vec<&TaskNode> = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(id.as_str()) {
                nodes.push(self.node(id)?);
            }
        }

        let mut by_name: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
        for node in &nodes {
            by_name
                .entry((node.source_template.as_str(), node.name.as_str()))
                .or_default()
                .push(node.id.as_str());
        }

        let mut prerequisites: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &nodes {
            let mut targets: Vec<&str> = Vec::new();
            for reference in &node.dependencies {
                if seen.contains(reference.as_str()) {
                    targets.push(reference.as_str());
                } else if let Some(named) =
                    by_name.get(&(node.source_template.as_str(), reference.as_str()))
                {
                    targets.extend(named.iter().copied().filter(|id| *id != node.id));
                } else {
                    tracing::debug!(
                        id = node.id.as_str(),
                        reference = reference.as_str(),
                        "Ignoring dependency outside the selection"
                    );
                }
            }
            targets.sort_unstable();
            targets.dedup();

            for target in &targets {
                dependents.entry(*target).or_default().push(node.id.as_str());
            }
            prerequisites.insert(node.id.as_str(), targets);
        }

        let mut pending: HashMap<&str, usize> =
            prerequisites.iter().map(|(id, deps)| (*id, deps.len())).collect();
        let mut ready: VecDeque<&str> =
            nodes.iter().map(|n| n.id.as_str()).filter(|id| pending[id] == 0).collect();

        let mut stages = Vec::new();
        while !ready.is_empty() {
            let layer: Vec<&str> = ready.drain(..).collect();
            for id in &layer {
                pending.remove(id);
            }

            let mut next: Vec<&str> = Vec::new();
            for id in &layer {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            // keep input order inside a layer
            ready = nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| next.contains(id))
                .collect();

            let stage = u32::try_from(stages.len() + 1).unwrap_or(u32::MAX);
            stages.push(ExecutionStage {
                stage,
                node_ids: layer.into_iter().map(str::to_string).collect(),
            });
        }

        if !pending.is_empty() {
            let cycle = find_cycle(&nodes, &pending, &prerequisites);
            return Err(FlowError::DependencyCycle(cycle));
        }

        Ok(stages)
    }

    fn node(&self, id: &str) -> FlowResult<&'a TaskNode> {
        self.db.get(id).ok_or_else(|| FlowError::UnknownNode(id.to_string()))
    }
}

/// Walk prerequisite edges among unscheduled nodes until one repeats.
///
/// Every unscheduled node still has an unscheduled prerequisite, so the walk
/// always closes a loop.
fn find_cycle(
    nodes: &[&TaskNode],
    pending: &HashMap<&str, usize>,
    prerequisites: &HashMap<&str, Vec<&str>>,
) -> Vec<String> {
    let start = nodes.iter().map(|n| n.id.as_str()).find(|id| pending.contains_key(id));
    let Some(mut current) = start else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    loop {
        if let Some(pos) = path.iter().position(|id| *id == current) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|id| (*id).to_string()).collect();
            cycle.push(current.to_string());
            return cycle;
        }
        path.push(current);

        let next = prerequisites
            .get(current)
            .and_then(|deps| deps.iter().find(|d| pending.contains_key(*d)));
        match next {
            Some(next) => current = *next,
            None => return path.into_iter().map(str::to_string).collect(),
        }
    }
}
