//! Capability tagging.
//!
//! A task is tagged with every capability whose keyword list has at least one
//! entry occurring in the task's name or job descriptions. Matching is plain
//! substring search on lowercased text, so a keyword can hit inside an
//! unrelated longer word ("model" in "remodel"). That imprecision is accepted.

use std::collections::BTreeSet;

use super::keywords::{KeywordTable, GENERAL_CAPABILITY};

/// Assigns capability tags to tasks.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityExtractor<'a> {
    table: &'a KeywordTable,
}

impl<'a> CapabilityExtractor<'a> {
    /// Create an extractor over a keyword table.
    pub fn new(table: &'a KeywordTable) -> Self {
        Self { table }
    }

    /// Tags for a task. Never empty: unmatched tasks get `general`.
    pub fn extract(&self, name: &str, jobs: &[String]) -> BTreeSet<String> {
        let mut text = name.to_lowercase();
        for job in jobs {
            text.push(' ');
            text.push_str(&job.to_lowercase());
        }

        let mut tags: BTreeSet<String> = self
            .table
            .capabilities
            .iter()
            .filter(|c| c.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|c| c.tag.clone())
            .collect();

        if tags.is_empty() {
            tags.insert(GENERAL_CAPABILITY.to_string());
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> KeywordTable {
        KeywordTable::embedded().unwrap()
    }

    fn jobs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_japanese_keywords() {
        let table = table();
        let extractor = CapabilityExtractor::new(&table);

        let tags = extractor.extract("動画編集", &jobs(&["映像をつなぐ"]));
        assert!(tags.contains("image_to_video"));
        assert!(!tags.contains(GENERAL_CAPABILITY));
    }

    #[test]
    fn test_multiple_capabilities() {
        let table = table();
        let extractor = CapabilityExtractor::new(&table);

        let tags = extractor.extract("Narration", &jobs(&["Extract voice track", "Quality check"]));
        assert!(tags.contains("video_to_audio"));
        assert!(tags.contains("quality_control"));
    }

    #[test]
    fn test_case_insensitive_match() {
        let table = table();
        let extractor = CapabilityExtractor::new(&table);

        let tags = extractor.extract("Compose BGM", &[]);
        assert!(tags.contains("text_to_music"));
    }

    #[test]
    fn test_unmatched_task_is_general() {
        let table = table();
        let extractor = CapabilityExtractor::new(&table);

        let tags = extractor.extract("Wait", &jobs(&["sleep 30"]));
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec![GENERAL_CAPABILITY.to_string()]);
    }

    #[test]
    fn test_substring_collisions_are_kept() {
        let table = table();
        let extractor = CapabilityExtractor::new(&table);

        // "remodel" contains "model"
        let tags = extractor.extract("Remodel kitchen", &[]);
        assert!(tags.contains("3d_generation"));
    }
}
