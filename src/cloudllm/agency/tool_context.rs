//! Per-branch tool state.
//!
//! A [`ToolContext`] is the only mutable state tools see. It is deliberately dumb: a string-keyed
//! bag of JSON values plus a set of file paths the current branch has read. Isolation between
//! parallel branches is achieved entirely by cloning this struct — there is no shared interior
//! mutability here, so two clones can never observe each other's writes.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Key under which `todo_write` persists its list; read back by the Agent's one-by-one gate.
pub const TODOS_KEY: &str = "todos";

/// Per-branch key/value store plus the set of absolute paths read so far.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    data: HashMap<String, Value>,
    read_files: HashSet<String>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn mark_file_read(&mut self, path: impl Into<String>) {
        self.read_files.insert(path.into());
    }

    pub fn was_file_read(&self, path: &str) -> bool {
        self.read_files.contains(path)
    }

    /// Produce an independent copy. Plain `Clone` already deep-copies both fields (`HashMap`
    /// and `HashSet` own their contents), so this is just a readable alias for `fork()` call
    /// sites that want to say what they mean.
    pub fn clone_for_fork(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_isolated() {
        let mut ctx = ToolContext::new();
        ctx.set("k", Value::from(1));
        ctx.mark_file_read("/a.txt");

        let mut forked = ctx.clone_for_fork();
        forked.set("k", Value::from(2));
        forked.mark_file_read("/b.txt");

        assert_eq!(ctx.get("k"), Some(&Value::from(1)));
        assert!(ctx.was_file_read("/a.txt"));
        assert!(!ctx.was_file_read("/b.txt"));

        assert_eq!(forked.get("k"), Some(&Value::from(2)));
        assert!(forked.was_file_read("/a.txt"));
        assert!(forked.was_file_read("/b.txt"));
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let ctx = ToolContext::new();
        assert_eq!(ctx.get_or("missing", Value::from("d")), Value::from("d"));
    }
}
