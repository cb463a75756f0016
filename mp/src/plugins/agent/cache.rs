//! Conversation-tree cache
//!
//! Replays previously seen conversations without touching the transport.
//! Nodes are keyed by the exact prompt text; follow-up prompts nest under
//! the node that produced them. Persisted once at benchmark end.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheNode {
    pub response: String,
    pub session_token: Option<String>,
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub follow_ups: HashMap<String, CacheNode>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConversationCache {
    #[serde(default)]
    roots: HashMap<String, CacheNode>,
}

impl ConversationCache {
    /// Load from disk. A missing or unreadable file yields an empty cache.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cache) => {
                    debug!(path = %path.display(), "conversation cache loaded");
                    cache
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "conversation cache unreadable, starting fresh");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let json = serde_json::to_string(self).context("Failed to serialize conversation cache")?;
        fs::write(path, json).context(format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "conversation cache saved");
        Ok(())
    }

    /// Walk a prompt path: the first element selects a root, the rest
    /// descend through follow-ups.
    pub fn get(&self, path: &[String]) -> Option<&CacheNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(first)?;
        for key in rest {
            node = node.follow_ups.get(key)?;
        }
        Some(node)
    }

    /// Store a node at a prompt path, creating intermediate nodes as
    /// needed and keeping existing follow-ups at the destination.
    pub fn insert(&mut self, path: &[String], node: CacheNode) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };

        let mut slot = self.roots.entry(first.clone()).or_default();
        for key in rest {
            slot = slot.follow_ups.entry(key.clone()).or_default();
        }

        slot.response = node.response;
        slot.session_token = node.session_token;
        slot.last_message_id = node.last_message_id;
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn node(response: &str) -> CacheNode {
        CacheNode {
            response: response.to_string(),
            session_token: Some("sess-1".to_string()),
            last_message_id: Some("msg-1".to_string()),
            follow_ups: HashMap::new(),
        }
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_and_get_root() {
        let mut cache = ConversationCache::default();
        cache.insert(&path(&["initial prompt"]), node("first response"));

        let hit = cache.get(&path(&["initial prompt"])).unwrap();
        assert_eq!(hit.response, "first response");
        assert_eq!(hit.session_token.as_deref(), Some("sess-1"));
    }

    #[test]
    fn test_follow_ups_nest() {
        let mut cache = ConversationCache::default();
        cache.insert(&path(&["initial"]), node("r1"));
        cache.insert(&path(&["initial", "fix the compile error"]), node("r2"));
        cache.insert(&path(&["initial", "fix the compile error", "closer now"]), node("r3"));

        assert_eq!(cache.get(&path(&["initial", "fix the compile error"])).unwrap().response, "r2");
        assert_eq!(
            cache
                .get(&path(&["initial", "fix the compile error", "closer now"]))
                .unwrap()
                .response,
            "r3"
        );
        assert!(cache.get(&path(&["initial", "unknown"])).is_none());
    }

    #[test]
    fn test_insert_preserves_existing_follow_ups() {
        let mut cache = ConversationCache::default();
        cache.insert(&path(&["initial"]), node("r1"));
        cache.insert(&path(&["initial", "follow"]), node("r2"));

        // Re-inserting the root keeps its subtree.
        cache.insert(&path(&["initial"]), node("r1 updated"));

        assert_eq!(cache.get(&path(&["initial"])).unwrap().response, "r1 updated");
        assert_eq!(cache.get(&path(&["initial", "follow"])).unwrap().response, "r2");
    }

    #[test]
    fn test_round_trip_through_disk() {
        let temp = tempdir().unwrap();
        let cache_path = temp.path().join("cache/conversations.json");

        let mut cache = ConversationCache::default();
        cache.insert(&path(&["initial"]), node("r1"));
        cache.insert(&path(&["initial", "follow"]), node("r2"));
        cache.save(&cache_path).unwrap();

        let loaded = ConversationCache::load(&cache_path);
        assert_eq!(loaded.get(&path(&["initial", "follow"])).unwrap().response, "r2");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let cache = ConversationCache::load(&temp.path().join("nope.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let temp = tempdir().unwrap();
        let cache_path = temp.path().join("bad.json");
        fs::write(&cache_path, "{not json").unwrap();

        let cache = ConversationCache::load(&cache_path);
        assert!(cache.is_empty());
    }
}
