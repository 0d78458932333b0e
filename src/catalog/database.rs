//! The task node database.
//!
//! Built from a template directory and cached as JSON. The template directory
//! stays the source of truth; the JSON file is only a cache for later
//! resolution runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::capability::CapabilityExtractor;
use super::keywords::KeywordTable;
use super::node::{NodeIdAllocator, TaskNode};
use super::services::ServiceScanner;
use super::template::TemplateIndex;
use crate::core::{FlowError, FlowResult};

/// Task nodes plus a reverse index from capability tag to node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDatabase {
    /// Nodes by id
    pub task_nodes: BTreeMap<String, TaskNode>,

    /// Node ids by capability tag, in insertion order
    pub capabilities_index: BTreeMap<String, Vec<String>>,

    /// How the database was produced
    #[serde(default)]
    pub extraction_metadata: ExtractionMetadata,
}

/// Summary of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionMetadata {
    /// Number of nodes
    pub total_nodes: usize,

    /// Number of distinct capability tags
    pub total_capabilities: usize,

    /// Templates that contributed nodes
    pub source_templates: Vec<String>,

    /// Template files that failed to load
    pub skipped_templates: Vec<String>,

    /// Version of the keyword table used for tagging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_version: Option<u32>,

    /// RFC 3339 timestamp of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<String>,
}

impl NodeDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load templates from `dir` and extract every task into a node.
    pub fn extract(dir: &Path, table: &KeywordTable) -> FlowResult<Self> {
        let index = TemplateIndex::load(dir)?;
        Self::build(&index, table)
    }

    /// Extract nodes from loaded templates.
    pub fn build(index: &TemplateIndex, table: &KeywordTable) -> FlowResult<Self> {
        let extractor = CapabilityExtractor::new(table);
        let scanner = ServiceScanner::new(&table.service_prefixes)?;
        let mut db = Self::new();

        for template in index.templates() {
            let services = scanner.scan(&template.raw);
            let mut ids = NodeIdAllocator::new();

            for task in template.tasks() {
                let id = ids.allocate(&template.name, task);
                let capabilities = extractor.extract(&task.name, &task.jobs);
                tracing::debug!(
                    id,
                    task = task.name,
                    capabilities = ?capabilities,
                    "Extracted task node"
                );
                let node = TaskNode::from_template(
                    id,
                    &template.name,
                    task,
                    capabilities,
                    services.clone(),
                );
                db.insert(node);
            }
        }

        db.extraction_metadata.skipped_templates =
            index.skipped().iter().map(|s| s.path.display().to_string()).collect();
        db.extraction_metadata.keywords_version = Some(table.version);
        db.extraction_metadata.extracted_at = Some(chrono::Utc::now().to_rfc3339());
        db.refresh_metadata();

        tracing::info!(
            nodes = db.len(),
            capabilities = db.capabilities_index.len(),
            "Node database built"
        );

        Ok(db)
    }

    /// Build a database from nodes directly.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TaskNode>) -> Self {
        let mut db = Self::new();
        for node in nodes {
            db.insert(node);
        }
        db.refresh_metadata();
        db
    }

    /// Insert a node and index its capabilities.
    ///
    /// Returns the node previously stored under the same id, if any.
    pub fn insert(&mut self, node: TaskNode) -> Option<TaskNode> {
        let previous = self.task_nodes.remove(&node.id);
        if let Some(ref old) = previous {
            tracing::warn!(id = old.id, "Replacing task node with duplicate id");
            self.unindex(old);
        }

        for capability in &node.capabilities {
            let ids = self.capabilities_index.entry(capability.clone()).or_default();
            if !ids.contains(&node.id) {
                ids.push(node.id.clone());
            }
        }
        self.task_nodes.insert(node.id.clone(), node);

        previous
    }

    fn unindex(&mut self, node: &TaskNode) {
        for capability in &node.capabilities {
            if let Some(ids) = self.capabilities_index.get_mut(capability) {
                ids.retain(|id| id != &node.id);
                if ids.is_empty() {
                    self.capabilities_index.remove(capability);
                }
            }
        }
    }

    /// Recompute the counters and template list in the metadata.
    pub fn refresh_metadata(&mut self) {
        let mut templates: Vec<String> =
            self.task_nodes.values().map(|n| n.source_template.clone()).collect();
        templates.sort();
        templates.dedup();

        self.extraction_metadata.total_nodes = self.task_nodes.len();
        self.extraction_metadata.total_capabilities = self.capabilities_index.len();
        self.extraction_metadata.source_templates = templates;
    }

    /// Look up a node.
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.task_nodes.get(id)
    }

    /// Whether a node exists.
    pub fn contains(&self, id: &str) -> bool {
        self.task_nodes.contains_key(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.task_nodes.len()
    }

    /// Whether the database has no nodes.
    pub fn is_empty(&self) -> bool {
        self.task_nodes.is_empty()
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.task_nodes.values()
    }

    /// Node ids offering a capability.
    pub fn nodes_with(&self, capability: &str) -> &[String] {
        self.capabilities_index.get(capability).map_or(&[], Vec::as_slice)
    }

    /// Whether any node offers a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities_index.contains_key(capability)
    }

    /// Indexed capability tags.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.capabilities_index.keys().map(String::as_str)
    }

    /// `(capability, id)` pairs in the index whose node does not exist.
    ///
    /// Only possible when an index was loaded from a stale file.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.capabilities_index
            .iter()
            .flat_map(|(tag, ids)| ids.iter().map(move |id| (tag, id)))
            .filter(|(_, id)| !self.task_nodes.contains_key(*id))
            .map(|(tag, id)| (tag.clone(), id.clone()))
            .collect()
    }

    /// Write the database as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> FlowResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|source| FlowError::Write { path: parent.to_path_buf(), source })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|source| FlowError::Write { path: path.to_path_buf(), source })?;

        tracing::info!(path = ?path, nodes = self.len(), "Node database saved");
        Ok(())
    }

    /// Read a database written by [`NodeDatabase::save`].
    pub fn load(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| FlowError::Read { path: path.to_path_buf(), source })?;
        let db: Self = serde_json::from_str(&content)?;

        let dangling = db.dangling_references();
        if !dangling.is_empty() {
            tracing::warn!(
                path = ?path,
                count = dangling.len(),
                "Capability index references missing nodes; regenerate the database"
            );
        }

        Ok(db)
    }
}
