// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{FarmError, FarmResult};
use crate::app::ports::{Connector, RemoteFsPort};
use crate::app::types::{Credentials, RemoteDirEntry, RemoteStat};

mod error;
mod session;

pub use error::AuthenticationFailure;
pub use session::{SessionManager, SshParams};

/// SFTP-backed remote filesystem over one shared session.
#[derive(Clone)]
pub struct SftpAdapter {
    session: Arc<SessionManager>,
}

impl SftpAdapter {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

/// Establishes an authenticated session per login and hands it out behind
/// the filesystem port.
pub struct SshConnector;

fn is_authentication_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<AuthenticationFailure>())
}

fn is_sftp_missing_path(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let Some(sftp_error) = cause.downcast_ref::<russh_sftp::client::error::Error>() else {
            return false;
        };
        matches!(
            sftp_error,
            russh_sftp::client::error::Error::Status(status)
                if status.status_code == russh_sftp::protocol::StatusCode::NoSuchFile
        )
    })
}

fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<russh::Error>() || cause.is::<std::io::Error>()
    })
}

fn map_connect_error(username: &str, err: anyhow::Error) -> FarmError {
    if is_authentication_failure(&err) {
        FarmError::InvalidCredentials {
            username: username.to_string(),
        }
    } else {
        FarmError::Connection(format!("{err:#}"))
    }
}

fn map_sftp_error(path: &str, err: anyhow::Error) -> FarmError {
    if is_sftp_missing_path(&err) {
        FarmError::NotFound(path.to_string())
    } else if is_transport_error(&err) {
        FarmError::Connection(format!("{err:#}"))
    } else {
        FarmError::Task(format!("{err:#}"))
    }
}

#[async_trait]
impl RemoteFsPort for SftpAdapter {
    #[tracing::instrument(name = "sftp", level = "debug", skip(self), fields(op = "stat", path = %path))]
    async fn stat(&self, path: &str) -> FarmResult<RemoteStat> {
        let is_dir = self
            .session
            .stat_raw(path)
            .await
            .map_err(|err| map_sftp_error(path, err))?;
        Ok(RemoteStat { is_dir })
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self), fields(op = "list", path = %path))]
    async fn list(&self, path: &str) -> FarmResult<Vec<RemoteDirEntry>> {
        let entries = self
            .session
            .list_raw(path)
            .await
            .map_err(|err| map_sftp_error(path, err))?;
        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| RemoteDirEntry { name, is_dir })
            .collect())
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self), fields(op = "mkdir", path = %path))]
    async fn mkdir(&self, path: &str) -> FarmResult<()> {
        self.session
            .mkdir_raw(path)
            .await
            .map_err(|err| map_sftp_error(path, err))
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self), fields(op = "remove", path = %path, is_dir))]
    async fn remove(&self, path: &str, is_dir: bool) -> FarmResult<()> {
        self.session
            .remove_raw(path, is_dir)
            .await
            .map_err(|err| map_sftp_error(path, err))
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self), fields(op = "rename", path = %old_path, to = %new_path))]
    async fn rename(&self, old_path: &str, new_path: &str) -> FarmResult<()> {
        self.session
            .rename_raw(old_path, new_path)
            .await
            .map_err(|err| map_sftp_error(old_path, err))
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self, local_path), fields(op = "put", path = %remote_path))]
    async fn put(&self, local_path: &Path, remote_path: &str) -> FarmResult<()> {
        self.session
            .put_raw(local_path, remote_path)
            .await
            .map_err(|err| map_sftp_error(remote_path, err))
    }

    #[tracing::instrument(name = "sftp", level = "debug", skip(self, local_path), fields(op = "get", path = %remote_path))]
    async fn get(&self, remote_path: &str, local_path: &Path) -> FarmResult<()> {
        self.session
            .get_raw(remote_path, local_path)
            .await
            .map_err(|err| map_sftp_error(remote_path, err))
    }
}

#[async_trait]
impl Connector for SshConnector {
    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, credentials),
        fields(op = "connect", host = %credentials.address, user = %credentials.username, port = credentials.port)
    )]
    async fn connect(&self, credentials: &Credentials) -> FarmResult<Arc<dyn RemoteFsPort>> {
        let params = SshParams {
            host: credentials.address.clone(),
            port: credentials.port,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            keepalive_secs: 15,
        };
        let session = Arc::new(SessionManager::new(params));
        session
            .connect()
            .await
            .map_err(|err| map_connect_error(&credentials.username, err))?;
        Ok(Arc::new(SftpAdapter::new(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn auth_failures_map_to_invalid_credentials() {
        let err = anyhow::Error::from(AuthenticationFailure).context("password auth failed");
        let mapped = map_connect_error("alice", err);
        assert!(matches!(mapped, FarmError::InvalidCredentials { .. }));
        assert!(mapped.to_string().contains("alice"));
    }

    #[test]
    fn transport_failures_map_to_connection() {
        let err = anyhow::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(
            map_connect_error("alice", err),
            FarmError::Connection(_)
        ));
    }

    #[test]
    fn missing_remote_path_maps_to_not_found() {
        let status = russh_sftp::protocol::Status {
            id: 0,
            status_code: russh_sftp::protocol::StatusCode::NoSuchFile,
            error_message: "no such file".to_string(),
            language_tag: "en".to_string(),
        };
        let err = anyhow::Error::from(russh_sftp::client::error::Error::Status(status))
            .context("stat /gone");
        let mapped = map_sftp_error("/gone", err);
        assert!(mapped.is_not_found());
    }

    #[test]
    fn other_sftp_failures_map_to_task() {
        let mapped = map_sftp_error("/p", anyhow!("permission denied"));
        assert!(matches!(mapped, FarmError::Task(_)));
    }
}
