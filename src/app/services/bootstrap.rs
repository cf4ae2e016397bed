// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Connection bootstrap: connect with retries, ensure the canonical remote
//! layout, and push a fresh helper-script payload through the task queue.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::errors::{FarmError, FarmResult};
use crate::app::ports::{Connector, RemoteFsPort, SchedulerPort, SubmittedJob, TaskSink};
use crate::app::services::queue::TaskQueue;
use crate::app::types::{Credentials, FarmLayout, JobDescriptor, Task};

pub const MAX_CONNECTION_ATTEMPTS: u32 = 3;

/// A fully provisioned connection: the shared client, the serialized task
/// queue bound to it, and the layout resolved for this user.
pub struct FarmSession {
    pub client: Arc<dyn RemoteFsPort>,
    pub queue: TaskQueue,
    pub layout: FarmLayout,
    pub username: String,
}

// The client and queue handles carry no useful state to print.
impl fmt::Debug for FarmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FarmSession")
            .field("username", &self.username)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl FarmSession {
    /// Hand a built descriptor to the scheduler.
    #[tracing::instrument(level = "info", skip_all, fields(job = %descriptor.name, frames = descriptor.agenda.len()))]
    pub async fn submit_job(
        &self,
        scheduler: &dyn SchedulerPort,
        descriptor: &JobDescriptor,
    ) -> FarmResult<Vec<SubmittedJob>> {
        let submitted = scheduler.submit(descriptor).await?;
        tracing::info!(count = submitted.len(), "job accepted by scheduler");
        Ok(submitted)
    }
}

pub struct Bootstrapper {
    connector: Arc<dyn Connector>,
    layout: FarmLayout,
    /// Local directory holding the helper scripts pushed on every connect.
    payload_dir: PathBuf,
    max_attempts: u32,
}

impl Bootstrapper {
    pub fn new(connector: Arc<dyn Connector>, layout: FarmLayout, payload_dir: PathBuf) -> Self {
        Self {
            connector,
            layout,
            payload_dir,
            max_attempts: MAX_CONNECTION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Full bootstrap: connect, ensure the layout directories, replace the
    /// helper payload. Fails closed: any step failing means no session.
    #[tracing::instrument(level = "info", skip_all, fields(user = %credentials.username))]
    pub async fn connect(
        &self,
        credentials: &Credentials,
        sink: Arc<dyn TaskSink>,
    ) -> FarmResult<FarmSession> {
        let client = self.connect_with_retries(credentials).await?;
        self.ensure_layout(client.as_ref(), &credentials.username)
            .await?;
        let queue = TaskQueue::spawn(client.clone(), sink);
        self.provision_payload(client.as_ref(), &queue, &credentials.username)
            .await?;
        Ok(FarmSession {
            client,
            queue,
            layout: self.layout.clone(),
            username: credentials.username.clone(),
        })
    }

    /// Transport failures are retried up to the attempt budget; a rejected
    /// login is final and returned immediately.
    async fn connect_with_retries(
        &self,
        credentials: &Credentials,
    ) -> FarmResult<Arc<dyn RemoteFsPort>> {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.connector.connect(credentials).await {
                Ok(client) => return Ok(client),
                Err(err @ FarmError::InvalidCredentials { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, max = self.max_attempts, "connect failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            FarmError::Connection("no connection attempt was made".into())
        }))
    }

    /// Create the user's canonical directories where missing. A plain file
    /// squatting on a layout path is unrecoverable here.
    async fn ensure_layout(&self, client: &dyn RemoteFsPort, user: &str) -> FarmResult<()> {
        for dir in [
            self.layout.home_root(user),
            self.layout.farm_root(user),
            self.layout.output_root(user),
            self.layout.project_root(user),
        ] {
            self.ensure_remote_dir(client, &dir).await?;
        }
        Ok(())
    }

    async fn ensure_remote_dir(&self, client: &dyn RemoteFsPort, path: &str) -> FarmResult<()> {
        match client.stat(path).await {
            Ok(stat) if stat.is_dir => Ok(()),
            Ok(_) => Err(FarmError::Task(format!(
                "{path} exists but is not a directory"
            ))),
            Err(err) if err.is_not_found() => {
                tracing::debug!(path, "creating layout directory");
                client.mkdir(path).await
            }
            Err(err) => Err(err),
        }
    }

    /// Replace the remote helper payload wholesale: delete the old package
    /// directory if present, then mirror-upload the local payload. Both run
    /// through the queue so progress reaches the session's sink and later
    /// tasks are ordered behind them.
    async fn provision_payload(
        &self,
        client: &dyn RemoteFsPort,
        queue: &TaskQueue,
        user: &str,
    ) -> FarmResult<()> {
        let package_root = self.layout.package_root(user);
        if client.exists(&package_root).await? {
            let outcome = queue
                .enqueue_blocking(Task::delete(vec![package_root.clone()]))
                .await?;
            if !outcome.success {
                return Err(FarmError::Task(format!(
                    "could not remove stale payload: {}",
                    outcome.message
                )));
            }
        }
        let outcome = queue
            .enqueue_blocking(Task::upload(vec![(
                self.payload_dir.to_string_lossy().into_owned(),
                package_root,
            )]))
            .await?;
        if !outcome.success {
            return Err(FarmError::Task(format!(
                "payload upload failed: {}",
                outcome.message
            )));
        }
        Ok(())
    }
}
