//! Secondary label index

use crate::Label;
use std::collections::{BTreeMap, BTreeSet};

/// Receives label postings as series come and go
pub trait LabelIndex: Send + Sync {
    /// Index `key` under each of its labels
    fn index_metric(&mut self, key: &str, labels: &[Label]);

    /// Remove `key` from the postings of each of its labels
    fn remove_indexed_metric(&mut self, key: &str, labels: &[Label]);
}

/// In-memory posting lists: label -> series keys
#[derive(Debug, Default)]
pub struct MemoryIndex {
    postings: BTreeMap<Label, BTreeSet<String>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Series keys carrying `name=value`, in key order
    pub fn keys_for(&self, name: &str, value: &str) -> Vec<String> {
        self.postings
            .get(&Label::new(name, value))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct labels indexed
    pub fn label_count(&self) -> usize {
        self.postings.len()
    }
}

impl LabelIndex for MemoryIndex {
    fn index_metric(&mut self, key: &str, labels: &[Label]) {
        for label in labels {
            self.postings
                .entry(label.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn remove_indexed_metric(&mut self, key: &str, labels: &[Label]) {
        for label in labels {
            if let Some(keys) = self.postings.get_mut(label) {
                keys.remove(key);
                if keys.is_empty() {
                    self.postings.remove(label);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postings() {
        let mut index = MemoryIndex::new();
        let labels = vec![Label::new("host", "a"), Label::new("dc", "eu")];
        index.index_metric("cpu", &labels);
        index.index_metric("mem", &labels[..1]);

        assert_eq!(index.keys_for("host", "a"), vec!["cpu", "mem"]);
        assert_eq!(index.keys_for("dc", "eu"), vec!["cpu"]);
        assert!(index.keys_for("host", "b").is_empty());

        index.remove_indexed_metric("cpu", &labels);
        assert_eq!(index.keys_for("host", "a"), vec!["mem"]);
        assert_eq!(index.label_count(), 1);
    }
}
