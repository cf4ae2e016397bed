// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use russh::client::AuthResult;

use crate::adapters::ssh::AuthenticationFailure;

use super::{ClientHandler, SessionManager};

impl SessionManager {
    /// Ensure we have a connected & authenticated handle. Reconnecting
    /// invalidates any SFTP channel opened on the previous handle.
    pub async fn connect(&self) -> Result<()> {
        let mut handle_field = self.handle.lock().await;

        // If handle exists but is closed, drop it so we reconnect.
        let needs_connect = match handle_field.as_ref() {
            None => true,
            Some(h) if h.is_closed() => true,
            Some(_) => false,
        };
        if !needs_connect {
            log::debug!(
                "reusing connection to {}@{}",
                &self.params.username,
                &self.params.host
            );
            return Ok(());
        }

        log::info!(
            "establishing connection with {}@{}:{}",
            &self.params.username,
            &self.params.host,
            self.params.port
        );
        let handler = ClientHandler::new(self.params.host.clone());
        let mut handle = russh::client::connect(
            self.config.clone(),
            (self.params.host.as_str(), self.params.port),
            handler,
        )
        .await
        .context("SSH connect failed")?;

        let result = handle
            .authenticate_password(self.params.username.clone(), self.params.password.clone())
            .await
            .context("password auth failed")?;
        match result {
            AuthResult::Success => {}
            AuthResult::Failure { .. } => return Err(AuthenticationFailure.into()),
        }

        *handle_field = Some(handle);
        drop(handle_field);
        // Stale channel from a previous handle, if any
        let _ = self.sftp.lock().await.take();

        // Start a keepalive pinger in the background
        if let Some(interval) = self.config.keepalive_interval {
            let handle_clone = self.handle.clone();
            let want_reply = true;
            let jh = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval / 2);
                loop {
                    ticker.tick().await;
                    let guard = handle_clone.lock().await;
                    let Some(handle) = guard.as_ref() else {
                        continue;
                    };
                    if handle.is_closed() {
                        log::debug!("keepalive handle is closed");
                        break;
                    }
                    if let Err(e) = handle.send_keepalive(want_reply).await {
                        log::debug!("error when sending a keepalive: {}", e);
                    }
                }
            });
            *self.keepalive_task_handle.lock().await = Some(jh);
        }
        Ok(())
    }
}
