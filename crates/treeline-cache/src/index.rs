//! Secondary Index
//!
//! Reverse maps from category, tag, and dependency to resident keys,
//! so group invalidation is one lookup instead of a full scan.

use std::collections::{HashMap, HashSet};

use treeline_core::CacheCategory;

use crate::entry::CacheEntry;

#[derive(Debug, Default)]
pub struct SecondaryIndex {
    by_category: HashMap<CacheCategory, HashSet<String>>,
    by_tag: HashMap<String, HashSet<String>>,
    by_dependency: HashMap<String, HashSet<String>>,
}

impl SecondaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, entry: &CacheEntry) {
        self.by_category
            .entry(entry.category)
            .or_default()
            .insert(key.to_string());
        for tag in &entry.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(key.to_string());
        }
        for dep in &entry.dependencies {
            self.by_dependency
                .entry(dep.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str, entry: &CacheEntry) {
        if let Some(keys) = self.by_category.get_mut(&entry.category) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_category.remove(&entry.category);
            }
        }
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        for dep in &entry.dependencies {
            if let Some(keys) = self.by_dependency.get_mut(dep) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_dependency.remove(dep);
                }
            }
        }
    }

    pub fn keys_for_category(&self, category: CacheCategory) -> Vec<String> {
        self.by_category
            .get(&category)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys_for_dependency(&self, dep: &str) -> Vec<String> {
        self.by_dependency
            .get(dep)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.by_category.clear();
        self.by_tag.clear();
        self.by_dependency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tagged(category: CacheCategory, tags: &[&str], deps: &[&str]) -> CacheEntry {
        let mut e = CacheEntry::new(Arc::new(vec![0]), category, 1);
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e.dependencies = deps.iter().map(|d| d.to_string()).collect();
        e
    }

    #[test]
    fn test_lookup_by_each_axis() {
        let mut index = SecondaryIndex::new();
        let a = tagged(CacheCategory::Render, &["rowset"], &["node:7"]);
        let b = tagged(CacheCategory::Layout, &["rowset"], &[]);
        index.insert("a", &a);
        index.insert("b", &b);

        assert_eq!(index.keys_for_category(CacheCategory::Render), vec!["a"]);
        let mut by_tag = index.keys_for_tag("rowset");
        by_tag.sort();
        assert_eq!(by_tag, vec!["a", "b"]);
        assert_eq!(index.keys_for_dependency("node:7"), vec!["a"]);
        assert!(index.keys_for_dependency("node:8").is_empty());
    }

    #[test]
    fn test_remove_unlinks_everywhere() {
        let mut index = SecondaryIndex::new();
        let a = tagged(CacheCategory::Search, &["q"], &["node:1"]);
        index.insert("a", &a);
        index.remove("a", &a);

        assert!(index.keys_for_category(CacheCategory::Search).is_empty());
        assert!(index.keys_for_tag("q").is_empty());
        assert!(index.keys_for_dependency("node:1").is_empty());
    }
}
