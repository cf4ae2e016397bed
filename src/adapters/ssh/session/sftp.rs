// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use tokio::fs as tokiofs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::SessionManager;

const TRANSFER_BLOCK: usize = 64 * 1024;

impl SessionManager {
    /// Open the SFTP subsystem on first use and keep it for the lifetime of
    /// the handle. Callers hold the slot's mutex for their whole operation.
    async fn ensure_sftp<'a>(&self, slot: &'a mut Option<SftpSession>) -> Result<&'a SftpSession> {
        if slot.is_none() {
            let guard = self.handle.lock().await;
            let handle = guard
                .as_ref()
                .ok_or_else(|| anyhow!("SSH handle lost before opening SFTP"))?;
            let channel = handle.channel_open_session().await?;
            channel.request_subsystem(true, "sftp").await?;
            *slot = Some(SftpSession::new(channel.into_stream()).await?);
        }
        slot.as_ref()
            .ok_or_else(|| anyhow!("SFTP subsystem unavailable"))
    }

    pub(crate) async fn stat_raw(&self, path: &str) -> Result<bool> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        let meta = sftp
            .metadata(path)
            .await
            .with_context(|| format!("stat {path}"))?;
        Ok(meta.is_dir())
    }

    /// Listing with the entry kind taken from the readdir attributes, so the
    /// caller never needs a per-entry stat round trip.
    pub(crate) async fn list_raw(&self, path: &str) -> Result<Vec<(String, bool)>> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        let entries = sftp
            .read_dir(path)
            .await
            .with_context(|| format!("readdir {path}"))?;
        let mut out: Vec<(String, bool)> = entries
            .into_iter()
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let is_dir = entry.metadata().is_dir();
                (entry.file_name(), is_dir)
            })
            .collect();
        out.sort();
        Ok(out)
    }

    pub(crate) async fn mkdir_raw(&self, path: &str) -> Result<()> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        sftp.create_dir(path)
            .await
            .with_context(|| format!("mkdir {path}"))
    }

    pub(crate) async fn remove_raw(&self, path: &str, is_dir: bool) -> Result<()> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        if is_dir {
            sftp.remove_dir(path)
                .await
                .with_context(|| format!("rmdir {path}"))
        } else {
            sftp.remove_file(path)
                .await
                .with_context(|| format!("rm {path}"))
        }
    }

    pub(crate) async fn rename_raw(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        sftp.rename(old_path, new_path)
            .await
            .with_context(|| format!("rename {old_path} -> {new_path}"))
    }

    pub(crate) async fn put_raw(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        let mut lf = tokiofs::File::open(local_path)
            .await
            .with_context(|| format!("opening local file {}", local_path.display()))?;
        let flags = OpenFlags::WRITE
            .union(OpenFlags::CREATE)
            .union(OpenFlags::TRUNCATE);
        let mut rfile = sftp
            .open_with_flags(remote_path, flags)
            .await
            .with_context(|| format!("opening remote file {remote_path}"))?;
        let mut buf = vec![0u8; TRANSFER_BLOCK];
        loop {
            let n = lf.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            rfile
                .write_all(&buf[..n])
                .await
                .with_context(|| format!("writing to {remote_path}"))?;
        }
        rfile.flush().await?;
        rfile.shutdown().await?;
        Ok(())
    }

    pub(crate) async fn get_raw(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let mut slot = self.sftp.lock().await;
        let sftp = self.ensure_sftp(&mut slot).await?;
        if let Some(parent) = local_path.parent() {
            tokiofs::create_dir_all(parent).await?;
        }
        let mut rfile = sftp
            .open(remote_path)
            .await
            .with_context(|| format!("opening remote file {remote_path}"))?;
        let mut lfile = tokiofs::File::create(local_path)
            .await
            .with_context(|| format!("creating local file {}", local_path.display()))?;
        tokio::io::copy(&mut rfile, &mut lfile).await?;
        lfile.flush().await?;
        Ok(())
    }
}
