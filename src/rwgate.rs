//! Read/write gate: concurrent readers, exclusive writers.

use crate::config::Access;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Each call declares its [`Access`] mode. Clones share the same lock.
///
/// Backed by tokio's fair, write-preferring `RwLock`: once a writer is queued, later readers wait
/// behind it, so a steady read load cannot starve writers. Guards drop on every exit path,
/// including panics and cancellation. The gate never rejects, so calls return the operation's
/// own `Result`.
#[derive(Debug, Clone, Default)]
pub struct ReadWriteGate {
    lock: Arc<RwLock<()>>,
}

impl ReadWriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invoke<T, E, Fut, Op>(&self, access: Access, operation: Op) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        match access {
            Access::Read => self.read(operation).await,
            Access::Write => self.write(operation).await,
        }
    }

    /// Run alongside other readers, never alongside a writer.
    pub async fn read<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let _guard = self.lock.read().await;
        tracing::trace!("read access granted");
        operation().await
    }

    /// Run with exclusive access.
    pub async fn write<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let _guard = self.lock.write().await;
        tracing::trace!("write access granted");
        operation().await
    }
}
