// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use russh::client::Config;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod auth;
mod sftp;

/// Minimal russh client handler. We rely on default implementations.
// TODO: verify the server key against known_hosts instead of trusting it;
// needs the farm's host key distributed with the installer first.
#[derive(Clone, Debug)]
struct ClientHandler {
    host: String,
}

impl ClientHandler {
    fn new(host: String) -> Self {
        Self { host }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        log::debug!(
            "accepting server key for {}: {}",
            self.host,
            server_public_key.fingerprint(Default::default())
        );
        Ok(true)
    }
}

/// Parameters for establishing the SSH connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Send keepalives to keep long connections healthy.
    pub keepalive_secs: u64,
}

/// Manager that owns a single long-lived SSH connection and its one SFTP
/// subsystem channel. Both are behind mutexes: the session serializes its
/// protocol use, callers never share an in-flight operation.
pub struct SessionManager {
    params: SshParams,
    config: Arc<Config>,
    handle: Arc<Mutex<Option<russh::client::Handle<ClientHandler>>>>,
    sftp: Arc<Mutex<Option<SftpSession>>>,
    // Background keepalive task
    keepalive_task_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl SessionManager {
    pub fn new(params: SshParams) -> Self {
        let cfg = Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            keepalive_interval: Some(Duration::from_secs(params.keepalive_secs)),
            // reasonable channel buffer and window sizes for file transfers
            channel_buffer_size: 64,
            window_size: 1024 * 1024,
            ..Default::default()
        };
        Self {
            params,
            config: Arc::new(cfg),
            handle: Arc::new(Mutex::new(None)),
            sftp: Arc::new(Mutex::new(None)),
            keepalive_task_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.keepalive_task_handle.lock().await.take() {
            task.abort();
        }
        let _ = self.sftp.lock().await.take();
        let mut handle_field = self.handle.lock().await;
        let _ = handle_field.take();
    }
}
