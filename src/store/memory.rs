use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::Store;

/// Write log kept in memory. Used offline and as the test double.
#[derive(Debug, Default)]
pub struct MemoryStore {
    writes: Mutex<Vec<(String, Value)>>,
    fail_prefix: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write under `prefix` fails.
    pub fn failing_under(prefix: &str) -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail_prefix: Some(prefix.to_string()),
        }
    }

    /// All successful writes in arrival order.
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Latest value written at exactly `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let writes = self.writes.lock().ok()?;
        writes.iter().rev().find(|(p, _)| p == path).map(|(_, v)| v.clone())
    }

    /// Number of writes whose path starts with `prefix`.
    pub fn count_under(&self, prefix: &str) -> usize {
        self.writes
            .lock()
            .map(|w| w.iter().filter(|(p, _)| p.starts_with(prefix)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        if let Some(prefix) = &self.fail_prefix {
            if path.starts_with(prefix.as_str()) {
                return Err(anyhow!("write refused for {}", path));
            }
        }
        let mut writes = self.writes.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        writes.push((path.to_string(), value.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn overwrite_keeps_history_and_latest() {
        let s = MemoryStore::new();
        s.write("a/b", &json!(1)).await.unwrap();
        s.write("a/b", &json!(2)).await.unwrap();
        s.write("a/c", &json!(3)).await.unwrap();
        assert_eq!(s.get("a/b"), Some(json!(2)));
        assert_eq!(s.count_under("a/"), 3);
        assert_eq!(s.writes().len(), 3);
    }
}
