use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::config::{StoreKind, StudyConfig};
use crate::logging::{agg_increment, log, log_write_failed, obj, v_str, Domain, Level};

mod http;
mod memory;
mod sqlite;

pub use http::RealtimeDbStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Hierarchical key-value persistence: put/overwrite only, never delete.
#[async_trait]
pub trait Store: Send + Sync {
    async fn write(&self, path: &str, value: &Value) -> Result<()>;
}

impl StoreKind {
    pub fn build(self, cfg: &StudyConfig) -> Result<Arc<dyn Store>> {
        match self {
            StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreKind::Sqlite => Ok(Arc::new(SqliteStore::open(&cfg.sqlite_path)?)),
            StoreKind::Http => Ok(Arc::new(RealtimeDbStore::new(
                cfg.store_base.clone(),
                cfg.store_auth.clone(),
                cfg.request_timeout(),
            )?)),
        }
    }
}

enum Op {
    Write { path: String, value: Value },
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front for a [`Store`].
///
/// Writes go to one background task in the order they are issued. Callers
/// never wait on them; a failed or late write is logged and dropped.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<Op>,
}

impl Recorder {
    /// Must be called from inside a tokio runtime. A write still pending
    /// after `write_timeout` is abandoned so later writes are not held up.
    pub fn spawn(store: Arc<dyn Store>, write_timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Op>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    Op::Write { path, value } => {
                        match timeout(write_timeout, store.write(&path, &value)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => log_write_failed(&path, &err.to_string()),
                            Err(_) => log_write_failed(&path, &format!("no reply within {:?}", write_timeout)),
                        }
                    }
                    Op::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    pub fn write(&self, path: impl Into<String>, value: Value) {
        let path = path.into();
        agg_increment("write");
        log(Level::Trace, Domain::Store, "write.queued", obj(&[("path", v_str(&path))]));
        if self.tx.send(Op::Write { path: path.clone(), value }).is_err() {
            log_write_failed(&path, "writer stopped");
        }
    }

    /// Resolves once every write issued before the call has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Op::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Never answers writes under `stuck/`; everything else lands in memory.
    struct Stalling {
        inner: MemoryStore,
    }

    #[async_trait]
    impl Store for Stalling {
        async fn write(&self, path: &str, value: &Value) -> Result<()> {
            if path.starts_with("stuck/") {
                std::future::pending::<()>().await;
            }
            self.inner.write(path, value).await
        }
    }

    #[tokio::test]
    async fn recorder_preserves_issue_order() {
        let store = Arc::new(MemoryStore::new());
        let rec = Recorder::spawn(store.clone(), WRITE_TIMEOUT);
        for i in 0..20 {
            rec.write(format!("p/{i}"), json!(i));
        }
        rec.flush().await;
        let paths: Vec<String> = store.writes().into_iter().map(|(p, _)| p).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("p/{i}")).collect();
        assert_eq!(paths, expected);
    }

    #[tokio::test]
    async fn failed_writes_are_swallowed() {
        let store = Arc::new(MemoryStore::failing_under("bad/"));
        let rec = Recorder::spawn(store.clone(), WRITE_TIMEOUT);
        rec.write("bad/one", json!(1));
        rec.write("good/two", json!(2));
        rec.flush().await;
        assert_eq!(store.get("good/two"), Some(json!(2)));
        assert_eq!(store.get("bad/one"), None);
    }

    #[tokio::test]
    async fn stalled_write_does_not_block_later_writes_or_flush() {
        let store = Arc::new(Stalling { inner: MemoryStore::new() });
        let rec = Recorder::spawn(store.clone(), Duration::from_millis(50));
        rec.write("stuck/one", json!(1));
        rec.write("good/two", json!(2));
        tokio::time::timeout(Duration::from_secs(5), rec.flush())
            .await
            .expect("flush returns once the stalled write is abandoned");
        assert_eq!(store.inner.get("good/two"), Some(json!(2)));
        assert_eq!(store.inner.get("stuck/one"), None);
    }
}
