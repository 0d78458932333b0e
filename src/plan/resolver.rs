//! Requirement resolution.
//!
//! Free-text requirements are mapped to capabilities through the keyword
//! table, then to the task nodes indexed under those capabilities.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{KeywordTable, NodeDatabase, TaskNode};
use crate::core::{FlowError, FlowResult};

/// Thresholds of the resolver heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverPolicy {
    /// Clarity scores below this value select the cheapest plan
    pub clarity_threshold: u8,

    /// Candidates kept per capability and per stage when clarity is low
    pub max_nodes_when_unclear: usize,

    /// Selections smaller than this are padded from fallback assumptions
    pub min_selected_nodes: usize,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self { clarity_threshold: 6, max_nodes_when_unclear: 3, min_selected_nodes: 5 }
    }
}

/// Extra information produced by an upstream requirement analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedContext {
    /// How clear the request was, 0-10
    pub clarity_score: Option<u8>,

    /// Assumptions made where the request was silent
    pub fallback_assumptions: Vec<String>,
}

impl EnhancedContext {
    /// Read a context bundle from a JSON file.
    ///
    /// Unknown keys are ignored so the file can carry the rest of the analysis.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| FlowError::Read { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether the clarity score falls below `threshold`.
    ///
    /// A missing score is treated as clear.
    pub fn is_unclear(&self, threshold: u8) -> bool {
        self.clarity_score.map_or(false, |score| score < threshold)
    }
}

/// How a requirement was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// A requirement phrase from the keyword table matched
    Direct,
    /// Only capability sub-words matched
    Partial,
    /// Nothing matched
    Unmatched,
}

/// Outcome for one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementMatch {
    /// The requirement as given
    pub requirement: String,

    /// How it matched
    pub kind: MatchKind,

    /// Capabilities it selected
    pub capabilities: Vec<String>,

    /// Candidate nodes it contributed before deduplication
    pub node_count: usize,
}

/// Result of resolving a set of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Selected node ids in plan order
    pub node_ids: Vec<String>,

    /// One entry per requirement, in input order
    pub matches: Vec<RequirementMatch>,

    /// Ids added by assumption padding
    pub padded: Vec<String>,
}

impl Resolution {
    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Requirements that matched nothing.
    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.matches
            .iter()
            .filter(|m| m.kind == MatchKind::Unmatched)
            .map(|m| m.requirement.as_str())
    }
}

/// Maps requirements to task nodes.
#[derive(Debug, Clone)]
pub struct RequirementResolver<'a> {
    db: &'a NodeDatabase,
    table: &'a KeywordTable,
    policy: ResolverPolicy,
}

impl<'a> RequirementResolver<'a> {
    /// Create a resolver with the default policy.
    pub fn new(db: &'a NodeDatabase, table: &'a KeywordTable) -> Self {
        Self { db, table, policy: ResolverPolicy::default() }
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: ResolverPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The policy in use.
    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// Resolve requirements to an ordered, duplicate-free list of node ids.
    ///
    /// A requirement that matches nothing contributes nothing; callers detect
    /// total failure through [`Resolution::is_empty`].
    pub fn resolve(
        &self,
        requirements: &[String],
        context: Option<&EnhancedContext>,
    ) -> Resolution {
        let unclear = context.map_or(false, |c| c.is_unclear(self.policy.clarity_threshold));
        if unclear {
            tracing::debug!(
                limit = self.policy.max_nodes_when_unclear,
                "Low clarity, preferring the cheapest nodes"
            );
        }

        let mut matches = Vec::with_capacity(requirements.len());
        let mut selected: BTreeSet<String> = BTreeSet::new();

        for requirement in requirements {
            let (kind, capabilities) = self.match_requirement(requirement);

            let mut node_count = 0;
            for capability in &capabilities {
                let mut candidates = self.candidates(capability);
                if unclear {
                    self.keep_cheapest(&mut candidates);
                }
                node_count += candidates.len();
                selected.extend(candidates.into_iter().map(|n| n.id.clone()));
            }

            tracing::debug!(
                requirement = requirement.as_str(),
                kind = ?kind,
                capabilities = ?capabilities,
                nodes = node_count,
                "Resolved requirement"
            );
            matches.push(RequirementMatch {
                requirement: requirement.clone(),
                kind,
                capabilities,
                node_count,
            });
        }

        if unclear {
            selected = self.truncate_stages(selected);
        }

        let mut padded = Vec::new();
        if selected.len() < self.policy.min_selected_nodes {
            if let Some(context) = context {
                padded = self.pad(&selected, &context.fallback_assumptions);
                selected.extend(padded.iter().cloned());
            }
        }

        let node_ids = self.order(selected);
        tracing::info!(
            requirements = requirements.len(),
            nodes = node_ids.len(),
            padded = padded.len(),
            "Requirements resolved"
        );

        Resolution { node_ids, matches, padded }
    }

    /// Capabilities a single requirement selects.
    pub fn match_requirement(&self, requirement: &str) -> (MatchKind, Vec<String>) {
        let text = requirement.to_lowercase();

        let direct = self
            .table
            .requirements
            .iter()
            .find(|entry| text.contains(entry.keyword.as_str()))
            .map(|entry| entry.capability.as_str());

        if let Some(capability) = direct {
            if self.db.has_capability(capability) {
                return (MatchKind::Direct, vec![capability.to_string()]);
            }
        }

        let partial: Vec<String> = self
            .db
            .capabilities()
            .filter(|tag| self.sub_words(tag).any(|word| text.contains(word)))
            .map(str::to_string)
            .collect();

        if partial.is_empty() {
            (MatchKind::Unmatched, partial)
        } else {
            (MatchKind::Partial, partial)
        }
    }

    fn sub_words<'t>(&'t self, tag: &'t str) -> impl Iterator<Item = &'t str> + 't {
        tag.split('_')
            .filter(|word| !word.is_empty())
            .filter(move |word| !self.table.fallback_stopwords.iter().any(|s| s == word))
    }

    /// Existing nodes indexed under `capability`.
    fn candidates(&self, capability: &str) -> Vec<&'a TaskNode> {
        self.db
            .nodes_with(capability)
            .iter()
            .filter_map(|id| {
                let node = self.db.get(id);
                if node.is_none() {
                    tracing::warn!(id = id.as_str(), capability, "Dropping dangling node id");
                }
                node
            })
            .collect()
    }

    fn keep_cheapest(&self, nodes: &mut Vec<&TaskNode>) {
        nodes.sort_by(|a, b| a.cost_key().cmp(&b.cost_key()));
        nodes.truncate(self.policy.max_nodes_when_unclear);
    }

    fn truncate_stages(&self, selected: BTreeSet<String>) -> BTreeSet<String> {
        let mut stages: BTreeMap<u32, Vec<&TaskNode>> = BTreeMap::new();
        for node in selected.iter().filter_map(|id| self.db.get(id)) {
            stages.entry(node.stage).or_default().push(node);
        }

        stages
            .into_values()
            .flat_map(|mut nodes| {
                self.keep_cheapest(&mut nodes);
                nodes.into_iter().map(|n| n.id.clone())
            })
            .collect()
    }

    /// Nodes added by the assumption rules, cheapest first.
    fn pad(&self, selected: &BTreeSet<String>, assumptions: &[String]) -> Vec<String> {
        let assumptions: Vec<String> = assumptions.iter().map(|a| a.to_lowercase()).collect();
        let mut added: Vec<String> = Vec::new();
        let mut taken: HashSet<&str> = selected.iter().map(String::as_str).collect();

        for rule in &self.table.assumption_rules {
            let triggered = assumptions
                .iter()
                .any(|a| rule.patterns.iter().any(|p| a.contains(p.as_str())));
            if !triggered {
                continue;
            }

            let mut candidates: Vec<&TaskNode> = self
                .candidates(&rule.capability)
                .into_iter()
                .filter(|n| !taken.contains(n.id.as_str()))
                .collect();
            candidates.sort_by(|a, b| a.cost_key().cmp(&b.cost_key()));

            for node in candidates.into_iter().take(rule.max_nodes) {
                tracing::debug!(id = node.id.as_str(), capability = rule.capability, "Padding");
                taken.insert(node.id.as_str());
                added.push(node.id.clone());
            }
        }

        added
    }

    fn order(&self, selected: BTreeSet<String>) -> Vec<String> {
        let mut nodes: Vec<&TaskNode> = selected.iter().filter_map(|id| self.db.get(id)).collect();
        nodes.sort_by(|a, b| a.priority_key().cmp(&b.priority_key()));
        nodes.into_iter().map(|n| n.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn node(id: &str, capability: &str, stage: u32, complexity: u32, duration: u32) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            source_template: "test".to_string(),
            stage,
            name: id.to_string(),
            parallel: true,
            jobs: Vec::new(),
            capabilities: BTreeSet::from([capability.to_string()]),
            mcp_services: BTreeSet::new(),
            dependencies: Vec::new(),
            duration_estimate: duration,
            complexity,
        }
    }

    fn scenario_db() -> NodeDatabase {
        NodeDatabase::from_nodes([
            node("img_a", "text_to_image", 1, 2, 5),
            node("img_b", "text_to_image", 1, 1, 8),
            node("img_c", "text_to_image", 1, 1, 3),
            node("vid_a", "image_to_video", 2, 1, 10),
            node("vid_b", "image_to_video", 2, 3, 4),
            node("music", "text_to_music", 3, 1, 5),
        ])
    }

    fn reqs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_direct_matches_in_priority_order() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let resolution = resolver.resolve(&reqs(&["テキストから画像生成", "画像から動画生成"]), None);

        assert_eq!(resolution.node_ids, vec!["img_c", "img_b", "img_a", "vid_a", "vid_b"]);
        assert!(resolution.matches.iter().all(|m| m.kind == MatchKind::Direct));
        assert_eq!(resolution.matches[0].capabilities, vec!["text_to_image"]);
        assert_eq!(resolution.matches[1].node_count, 2);
    }

    #[test]
    fn test_unmatched_requirement_is_empty() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let resolution = resolver.resolve(&reqs(&["存在しない機能"]), None);

        assert!(resolution.is_empty());
        assert_eq!(resolution.unmatched().collect::<Vec<_>>(), vec!["存在しない機能"]);
    }

    #[test]
    fn test_partial_match_on_sub_words() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let (kind, capabilities) = resolver.match_requirement("some music please");
        assert_eq!(kind, MatchKind::Partial);
        assert_eq!(capabilities, vec!["text_to_music"]);

        // "to" is a stop-word, so it does not pull in every *_to_* capability
        let (kind, _) = resolver.match_requirement("go to the store");
        assert_eq!(kind, MatchKind::Unmatched);
    }

    #[test]
    fn test_direct_match_without_indexed_capability_falls_back() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        // "3d" maps to 3d_generation, which has no nodes here
        let (kind, capabilities) = resolver.match_requirement("3d image");
        assert_eq!(kind, MatchKind::Partial);
        assert_eq!(capabilities, vec!["image_to_video", "text_to_image"]);
    }

    #[test]
    fn test_low_clarity_keeps_cheapest_three() {
        let nodes = (0..10u32).map(|i| {
            node(&format!("img_{i:02}"), "text_to_image", 1, 10 - i, 5)
        });
        let db = NodeDatabase::from_nodes(nodes);
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);
        let context = EnhancedContext { clarity_score: Some(3), fallback_assumptions: Vec::new() };

        let resolution = resolver.resolve(&reqs(&["画像生成"]), Some(&context));

        assert_eq!(resolution.node_ids, vec!["img_09", "img_08", "img_07"]);
    }

    #[test]
    fn test_clear_context_does_not_truncate() {
        let nodes = (0..10u32).map(|i| node(&format!("img_{i:02}"), "text_to_image", 1, 1, 5));
        let db = NodeDatabase::from_nodes(nodes);
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);
        let context = EnhancedContext { clarity_score: Some(8), fallback_assumptions: Vec::new() };

        let resolution = resolver.resolve(&reqs(&["画像生成"]), Some(&context));
        assert_eq!(resolution.node_ids.len(), 10);
    }

    #[test]
    fn test_low_clarity_truncates_each_stage() {
        let db = NodeDatabase::from_nodes([
            node("a", "text_to_image", 1, 1, 1),
            node("b", "text_to_image", 1, 1, 2),
            node("c", "image_to_video", 1, 1, 3),
            node("d", "image_to_video", 1, 1, 4),
        ]);
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);
        let context = EnhancedContext { clarity_score: Some(0), fallback_assumptions: Vec::new() };

        let resolution = resolver.resolve(&reqs(&["画像生成", "動画生成"]), Some(&context));
        assert_eq!(resolution.node_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_assumptions_pad_small_selection() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);
        let context = EnhancedContext {
            clarity_score: None,
            fallback_assumptions: reqs(&["Standard quality output", "background music"]),
        };

        let resolution = resolver.resolve(&reqs(&["動画生成"]), Some(&context));

        assert_eq!(resolution.padded, vec!["img_c", "img_b", "music"]);
        assert_eq!(
            resolution.node_ids,
            vec!["img_c", "img_b", "vid_a", "vid_b", "music"]
        );
    }

    #[test]
    fn test_no_padding_without_assumptions() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let resolution = resolver.resolve(&reqs(&["動画生成"]), Some(&EnhancedContext::default()));
        assert!(resolution.padded.is_empty());
        assert_eq!(resolution.node_ids.len(), 2);
    }

    #[test]
    fn test_duplicates_and_dangling_ids_removed() {
        let mut db = scenario_db();
        db.capabilities_index
            .get_mut("text_to_image")
            .unwrap()
            .push("stale_1_deadbeef".to_string());
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let resolution = resolver.resolve(&reqs(&["画像生成", "text to image"]), None);

        assert_eq!(resolution.node_ids.len(), 3);
        assert!(resolution.node_ids.iter().all(|id| db.contains(id)));
    }

    #[test]
    fn test_stage_ordering_law() {
        let db = scenario_db();
        let table = KeywordTable::embedded().unwrap();
        let resolver = RequirementResolver::new(&db, &table);

        let resolution = resolver.resolve(&reqs(&["bgm", "画像生成", "動画生成"]), None);
        let stages: Vec<u32> =
            resolution.node_ids.iter().map(|id| db.get(id).unwrap().stage).collect();
        let mut sorted = stages.clone();
        sorted.sort_unstable();
        assert_eq!(stages, sorted);
    }

    #[test]
    fn test_context_load_ignores_extra_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(
            &path,
            r#"{"clarity_score": 4, "fallback_assumptions": ["bgm"], "intent": "promo"}"#,
        )
        .unwrap();

        let context = EnhancedContext::load(&path).unwrap();
        assert_eq!(context.clarity_score, Some(4));
        assert!(context.is_unclear(6));
        assert!(!context.is_unclear(4));
    }
}
