//! Scoped batch context (§5).
//!
//! There is no async `Drop`, so "commit on scope exit, or discard if the
//! scope is abandoned" has to be a function that owns the scope rather than
//! a guard value. [`scoped_batch`] opens a batch, runs the closure, commits
//! on `Ok` and discards on `Err` — the engine never leaves a batch open
//! after one of its own methods returns.

use std::future::Future;

use crate::error::Result;
use crate::storage::StorageBackend;

/// Run `f` inside a backend batch opened on `backend`. Batches do not nest
/// (§5); calling this while the backend already has one open returns the
/// backend's `UsageError::BatchAlreadyOpen`.
pub async fn scoped_batch<B, F, Fut, T>(backend: &B, f: F) -> Result<T>
where
    B: StorageBackend,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    backend.begin_batch().await?;
    match f().await {
        Ok(value) => {
            backend.commit_batch().await?;
            Ok(value)
        }
        Err(err) => {
            let _ = backend.discard_batch().await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBackend;

    #[tokio::test]
    async fn commits_on_ok() {
        let backend = InMemoryBackend::new();
        scoped_batch(&backend, || async {
            backend.insert("t", "r", [("c".to_string(), "v".to_string())].into_iter().collect()).await
        })
        .await
        .unwrap();
        assert!(backend.get("t", "r").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn discards_on_err() {
        let backend = InMemoryBackend::new();
        let result: Result<()> = scoped_batch(&backend, || async {
            backend.insert("t", "r", [("c".to_string(), "v".to_string())].into_iter().collect()).await?;
            Err(crate::error::UsageError::NoBatchOpen.into())
        })
        .await;
        assert!(result.is_err());
        assert!(backend.get("t", "r").await.unwrap().is_none());
    }
}
