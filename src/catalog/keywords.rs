//! The keyword table shared by capability extraction and requirement resolution.
//!
//! A default table is embedded in the binary. A replacement can be loaded from
//! a YAML file with the same shape, so extraction and resolution always read
//! the same version of the keyword lists.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{FlowError, FlowResult};

/// Sentinel tag assigned to tasks that match no capability.
pub const GENERAL_CAPABILITY: &str = "general";

const DEFAULT_TABLE: &str = include_str!("keywords.yaml");

/// Versioned keyword resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTable {
    /// Version of the table, recorded in extraction metadata
    pub version: u32,

    /// Capabilities in the order they are tested
    pub capabilities: Vec<CapabilityKeywords>,

    /// Requirement phrases in the order they are tested
    pub requirements: Vec<RequirementKeyword>,

    /// Service-category codes (`t2i`, `i2v`, ...)
    #[serde(default)]
    pub service_prefixes: Vec<String>,

    /// Capability sub-words ignored by the partial fallback match
    #[serde(default)]
    pub fallback_stopwords: Vec<String>,

    /// Padding rules for under-specified requirements
    #[serde(default)]
    pub assumption_rules: Vec<AssumptionRule>,
}

/// Keywords that indicate one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityKeywords {
    /// Capability tag
    pub tag: String,

    /// Keywords, any of which assigns the tag
    pub keywords: Vec<String>,
}

/// A requirement phrase mapped to a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementKeyword {
    /// Phrase searched for in the requirement text
    pub keyword: String,

    /// Capability the phrase selects
    pub capability: String,
}

/// Maps a fallback assumption onto extra nodes of one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionRule {
    /// Phrases, any of which triggers the rule
    #[serde(rename = "match")]
    pub patterns: Vec<String>,

    /// Capability to pad from
    pub capability: String,

    /// Maximum number of nodes the rule may add
    pub max_nodes: usize,
}

impl KeywordTable {
    /// The table embedded in the binary.
    pub fn embedded() -> FlowResult<Self> {
        Self::from_yaml(DEFAULT_TABLE)
    }

    /// Load a table from a YAML file.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| FlowError::Read { path: path.to_path_buf(), source })?;
        let table = Self::from_yaml(&content)?;
        tracing::debug!(path = ?path, version = table.version, "Loaded keyword table");
        Ok(table)
    }

    /// Load from `path` when given, otherwise use the embedded table.
    pub fn load_or_embedded(path: Option<&Path>) -> FlowResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::embedded(),
        }
    }

    /// Parse a table from YAML text.
    pub fn from_yaml(content: &str) -> FlowResult<Self> {
        let mut table: Self = serde_yaml::from_str(content)
            .map_err(|e| FlowError::Keywords(format!("failed to parse: {e}")))?;
        table.validate()?;
        table.normalize();
        Ok(table)
    }

    /// Capability tags in test order.
    pub fn capability_tags(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(|c| c.tag.as_str())
    }

    fn validate(&self) -> FlowResult<()> {
        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if capability.tag.trim().is_empty() {
                return Err(FlowError::Keywords("capability tag cannot be empty".to_string()));
            }
            if capability.tag == GENERAL_CAPABILITY {
                return Err(FlowError::Keywords(format!(
                    "'{GENERAL_CAPABILITY}' is reserved for unmatched tasks"
                )));
            }
            if !seen.insert(capability.tag.as_str()) {
                return Err(FlowError::Keywords(format!(
                    "capability '{}' is declared twice",
                    capability.tag
                )));
            }
            if capability.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(FlowError::Keywords(format!(
                    "capability '{}' has no keywords",
                    capability.tag
                )));
            }
        }

        for entry in &self.requirements {
            if entry.keyword.trim().is_empty() {
                return Err(FlowError::Keywords(format!(
                    "empty requirement keyword for '{}'",
                    entry.capability
                )));
            }
            if !seen.contains(entry.capability.as_str()) {
                tracing::warn!(
                    keyword = entry.keyword,
                    capability = entry.capability,
                    "Requirement keyword maps to an undeclared capability"
                );
            }
        }

        for rule in &self.assumption_rules {
            if rule.patterns.is_empty() {
                return Err(FlowError::Keywords(format!(
                    "assumption rule for '{}' has no patterns",
                    rule.capability
                )));
            }
        }

        Ok(())
    }

    /// Lowercase every phrase once so matching only lowercases the input.
    fn normalize(&mut self) {
        for capability in &mut self.capabilities {
            for keyword in &mut capability.keywords {
                *keyword = keyword.trim().to_lowercase();
            }
            capability.keywords.retain(|k| !k.is_empty());
        }
        for entry in &mut self.requirements {
            entry.keyword = entry.keyword.trim().to_lowercase();
        }
        for stopword in &mut self.fallback_stopwords {
            *stopword = stopword.to_lowercase();
        }
        for rule in &mut self.assumption_rules {
            for pattern in &mut rule.patterns {
                *pattern = pattern.trim().to_lowercase();
            }
        }
    }
}
