// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use std::path::Path;

use crate::app::errors::{FarmError, FarmResult};
use crate::app::types::{RemoteDirEntry, RemoteStat};

/// Thin transport shim over one persistent SFTP session.
///
/// Every call is a single blocking round-trip and never retries internally;
/// retry policy lives in the bootstrapper and the task queue. Callers needing
/// concurrency go through the task queue — the session is not safely shared
/// across concurrent protocol exchanges, and implementations serialize access.
///
/// Send+Sync because the port is held as `Arc<dyn RemoteFsPort>` by both the
/// queue worker task and synchronous tree-population callers.
#[async_trait]
pub trait RemoteFsPort: Send + Sync {
    /// Stat a remote path. A missing target is `FarmError::NotFound`,
    /// distinguished from transport failures.
    async fn stat(&self, path: &str) -> FarmResult<RemoteStat>;

    /// List a remote directory, ordered by name.
    async fn list(&self, path: &str) -> FarmResult<Vec<RemoteDirEntry>>;

    async fn mkdir(&self, path: &str) -> FarmResult<()>;

    /// Remove one filesystem object. A directory remove fails if non-empty;
    /// recursive deletion is the task queue's job.
    async fn remove(&self, path: &str, is_dir: bool) -> FarmResult<()>;

    async fn rename(&self, old_path: &str, new_path: &str) -> FarmResult<()>;

    /// Upload one local file to a remote path.
    async fn put(&self, local_path: &Path, remote_path: &str) -> FarmResult<()>;

    /// Download one remote file to a local path, creating parent directories.
    async fn get(&self, remote_path: &str, local_path: &Path) -> FarmResult<()>;

    /// Existence probe built on `stat`; `NotFound` becomes `Ok(false)`.
    async fn exists(&self, path: &str) -> FarmResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(FarmError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
