use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::Filter;
use crate::core::storage;

pub const MAX_HISTORY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub filter: Filter,
}

impl HistoryEntry {
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.filter.describe())
    }
}

/// Most-recent-first list of the last few distinct named searches.
pub struct SearchHistory {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl SearchHistory {
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = storage::load_json_or_default(&path)?;
        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record a search. Unnamed searches are not kept; a repeat moves to the front.
    pub fn add(&mut self, filter: &Filter) -> Result<()> {
        let Some(name) = filter.market_hash_name.clone() else {
            return Ok(());
        };
        let entry = HistoryEntry {
            name,
            filter: filter.clone(),
        };
        self.entries.retain(|e| e != &entry);
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY);
        storage::save_json(&self.path, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_five_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = SearchHistory::load(path.clone()).unwrap();

        for i in 0..7 {
            history.add(&Filter::for_item(format!("Item {}", i))).unwrap();
        }
        let names: Vec<&str> = history.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Item 6", "Item 5", "Item 4", "Item 3", "Item 2"]);

        let reloaded = SearchHistory::load(path).unwrap();
        assert_eq!(reloaded.entries().len(), MAX_HISTORY);
    }

    #[test]
    fn test_repeat_moves_to_front_without_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SearchHistory::load(dir.path().join("h.json")).unwrap();

        history.add(&Filter::for_item("A")).unwrap();
        history.add(&Filter::for_item("B")).unwrap();
        history.add(&Filter::for_item("A")).unwrap();

        let names: Vec<&str> = history.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_unnamed_search_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SearchHistory::load(dir.path().join("h.json")).unwrap();
        history.add(&Filter::default()).unwrap();
        assert!(history.entries().is_empty());
    }
}
