//! Accumulated results of a workflow run

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Ordered mapping from task name to the latest result recorded under it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMap {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result. Reusing a name overwrites the earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    /// Get a task's result
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    /// Check if a task has produced a result
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get a task's result, failing if it has not been recorded yet
    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("no result recorded for task '{}'", name))
    }

    /// Deserialize a task's result into a concrete type
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.require(name)?;
        serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("result of task '{}' has unexpected shape: {}", name, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Task names in first-recorded order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Merge another map into this one (other wins for same name)
    pub fn merge(&mut self, other: ResultMap) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }
}

/// One task invocation within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task name
    pub name: String,

    /// Input handed to the executor
    pub input: Value,

    /// Result, once the executor resolved successfully
    pub result: Option<Value>,

    /// When the executor was invoked
    pub started_at: DateTime<Utc>,

    /// Execution duration in milliseconds, once settled
    pub duration_ms: Option<u64>,
}

impl TaskRecord {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            result: None,
            started_at: Utc::now(),
            duration_ms: None,
        }
    }

    /// Whether the executor has resolved successfully
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let mut results = ResultMap::new();
        results.insert("add", json!(5));

        assert!(results.contains("add"));
        assert!(!results.contains("sub"));
        assert_eq!(results.get("add"), Some(&json!(5)));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut results = ResultMap::new();
        results.insert("first", json!(1));
        results.insert("second", json!(2));
        results.insert("first", json!(10));

        let names: Vec<_> = results.names().collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(results.get("first"), Some(&json!(10)));
    }

    #[test]
    fn test_require_missing() {
        let results = ResultMap::new();
        let err = results.require("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_get_as() {
        #[derive(Deserialize)]
        struct Review {
            approved: bool,
        }

        let mut results = ResultMap::new();
        results.insert("review", json!({"approved": true}));

        let review: Review = results.get_as("review").unwrap();
        assert!(review.approved);
        assert!(results.get_as::<Review>("other").is_err());
        assert!(results.get_as::<u32>("review").is_err());
    }

    #[test]
    fn test_merge() {
        let mut parent = ResultMap::new();
        parent.insert("a", json!("parent"));

        let mut child = ResultMap::new();
        child.insert("a", json!("child"));
        child.insert("b", json!(true));

        parent.merge(child);
        assert_eq!(parent.get("a"), Some(&json!("child")));
        assert_eq!(parent.to_json(), json!({"a": "child", "b": true}));
    }

    #[test]
    fn test_task_record() {
        let mut record = TaskRecord::new("fetch", json!({"id": 1}));
        assert!(!record.is_complete());

        record.result = Some(json!("done"));
        assert!(record.is_complete());
    }
}
