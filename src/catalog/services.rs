//! MCP service references in template text.

use std::collections::BTreeSet;

use regex::Regex;

use crate::core::{FlowError, FlowResult};

/// Finds MCP service identifiers in raw template text.
///
/// Recognised forms:
/// - `--mcp <name>`
/// - `mcp_<name>` / `mcp-<name>`
/// - `<prefix>-<name>` for each configured service-category prefix,
///   kept whole (e.g. `t2i-fal-imagen4-ultra`)
#[derive(Debug, Clone)]
pub struct ServiceScanner {
    flag: Regex,
    named: Regex,
    prefixed: Option<Regex>,
}

impl ServiceScanner {
    /// Build a scanner for the given service-category prefixes.
    pub fn new(prefixes: &[String]) -> FlowResult<Self> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| FlowError::Keywords(e.to_string()));

        let flag = compile(r"--mcp\s+([A-Za-z0-9_-]+)")?;
        let named = compile(r"\bmcp[_-]+([A-Za-z0-9_-]+)")?;

        let alternatives: Vec<String> =
            prefixes.iter().filter(|p| !p.is_empty()).map(|p| regex::escape(p)).collect();
        let prefixed = if alternatives.is_empty() {
            None
        } else {
            Some(compile(&format!(r"\b(?:{})-[A-Za-z0-9_-]+", alternatives.join("|")))?)
        };

        Ok(Self { flag, named, prefixed })
    }

    /// All distinct service identifiers mentioned in `text`, sorted.
    pub fn scan(&self, text: &str) -> BTreeSet<String> {
        let mut services = BTreeSet::new();

        for regex in [&self.flag, &self.named] {
            for caps in regex.captures_iter(text) {
                let name = caps[1].trim_matches(|c| c == '-' || c == '_');
                if !name.is_empty() {
                    services.insert(name.to_string());
                }
            }
        }

        if let Some(ref prefixed) = self.prefixed {
            for m in prefixed.find_iter(text) {
                services.insert(m.as_str().trim_end_matches(|c| c == '-' || c == '_').to_string());
            }
        }

        services
    }
}
