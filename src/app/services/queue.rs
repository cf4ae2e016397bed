// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Serialized task queue over one remote connection.
//!
//! Mutating filesystem operations are sent down an unbounded channel to a
//! single consumer task; only one task body executes at a time per client,
//! and the next queued task starts automatically when the previous one
//! reaches a terminal state. A failed task is reported and popped; it never
//! blocks the pipeline.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use walkdir::WalkDir;

use crate::app::errors::{FarmError, FarmResult};
use crate::app::ports::{RemoteFsPort, TaskEvent, TaskSink};
use crate::app::types::{Task, TaskKind};
use crate::util::remote_path;

/// Terminal state of one task, as delivered to blocking enqueuers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: String,
}

struct QueuedTask {
    task: Task,
    done_tx: oneshot::Sender<TaskOutcome>,
}

/// Handle to the queue. Dropping it closes the channel; the worker drains
/// what was already enqueued and exits.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
}

/// Receipt for a non-blocking enqueue; await it to observe the terminal
/// state. Progress along the way arrives at the queue's [`TaskSink`].
pub struct TaskTicket {
    done_rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskTicket {
    pub async fn wait(self) -> FarmResult<TaskOutcome> {
        self.done_rx
            .await
            .map_err(|_| FarmError::Task("task queue worker stopped before completion".into()))
    }
}

impl TaskQueue {
    /// Spawn the consumer on the current runtime. The client connection is
    /// exclusively owned by this worker for the duration of each task body.
    pub fn spawn(client: Arc<dyn RemoteFsPort>, sink: Arc<dyn TaskSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(rx, client, sink));
        Self { tx }
    }

    /// Enqueue and return immediately; FIFO order is submission order.
    pub fn enqueue(&self, task: Task) -> FarmResult<TaskTicket> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(QueuedTask { task, done_tx })
            .map_err(|_| FarmError::Task("task queue worker is gone".into()))?;
        Ok(TaskTicket { done_rx })
    }

    /// Enqueue and wait for the task's terminal state. Used during bootstrap,
    /// which must not return until the payload upload drained.
    pub async fn enqueue_blocking(&self, task: Task) -> FarmResult<TaskOutcome> {
        self.enqueue(task)?.wait().await
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<QueuedTask>,
    client: Arc<dyn RemoteFsPort>,
    sink: Arc<dyn TaskSink>,
) {
    while let Some(queued) = rx.recv().await {
        let kind = queued.task.kind;
        tracing::debug!(%kind, items = queued.task.items.len(), "task started");
        let outcome = match run_task(client.as_ref(), sink.as_ref(), &queued.task).await {
            Ok(message) => {
                sink.send(TaskEvent::Completed {
                    kind,
                    success: true,
                    message: message.clone(),
                })
                .await;
                TaskOutcome {
                    success: true,
                    message,
                }
            }
            Err(err) => {
                // Isolate the failure to this task and keep consuming.
                let detail = err.to_string();
                tracing::warn!(%kind, "task failed: {detail}");
                sink.send(TaskEvent::Error(detail.clone())).await;
                sink.send(TaskEvent::Completed {
                    kind,
                    success: false,
                    message: detail.clone(),
                })
                .await;
                TaskOutcome {
                    success: false,
                    message: detail,
                }
            }
        };
        let _ = queued.done_tx.send(outcome);
    }
}

async fn run_task(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    task: &Task,
) -> FarmResult<String> {
    match task.kind {
        TaskKind::Rename => {
            for item in &task.items {
                sink.send(TaskEvent::Text(format!(
                    "renaming {} -> {}",
                    item.source, item.dest
                )))
                .await;
                client.rename(&item.source, &item.dest).await?;
            }
            report_progress(sink, task.items.len(), task.items.len()).await;
            Ok(format!("renamed {} item(s)", task.items.len()))
        }
        TaskKind::Mkdir => {
            for item in &task.items {
                if client.exists(&item.dest).await? {
                    return Err(FarmError::Task(format!(
                        "folder already exists: {}",
                        item.dest
                    )));
                }
                sink.send(TaskEvent::Text(format!("creating {}", item.dest)))
                    .await;
                client.mkdir(&item.dest).await?;
            }
            report_progress(sink, task.items.len(), task.items.len()).await;
            Ok(format!("created {} folder(s)", task.items.len()))
        }
        TaskKind::Upload => run_upload(client, sink, task).await,
        TaskKind::Download => run_download(client, sink, task).await,
        TaskKind::Delete => run_delete(client, sink, task).await,
    }
}

/// Count pre-pass + recursive mirror upload. Directories are created
/// top-down, files transferred as encountered.
async fn run_upload(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    task: &Task,
) -> FarmResult<String> {
    // Pre-pass: the total is computed before the mutating body runs, inside
    // this same queued task. A slow local walk blocks this task only.
    let mut total = 0usize;
    for item in &task.items {
        total += count_local_files(Path::new(&item.source));
    }
    let mut done = 0usize;
    report_progress(sink, done, total).await;

    for item in &task.items {
        let local = Path::new(&item.source);
        if local.is_dir() {
            upload_tree(client, sink, local, &item.dest, &mut done, total).await?;
        } else {
            sink.send(TaskEvent::Text(format!("uploading {}", item.dest)))
                .await;
            client.put(local, &item.dest).await?;
            done += 1;
            report_progress(sink, done, total).await;
        }
    }
    Ok(format!("uploaded {done} file(s)"))
}

async fn upload_tree(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    local_root: &Path,
    remote_root: &str,
    done: &mut usize,
    total: usize,
) -> FarmResult<()> {
    if !client.exists(remote_root).await? {
        client.mkdir(remote_root).await?;
    }
    // WalkDir yields parents before children, so remote directories exist by
    // the time their files transfer.
    for entry in WalkDir::new(local_root).min_depth(1) {
        let entry =
            entry.map_err(|err| FarmError::Task(format!("local walk failed: {err}")))?;
        let rel = entry
            .path()
            .strip_prefix(local_root)
            .map_err(|err| FarmError::Task(format!("local walk escaped its root: {err}")))?;
        let remote_child = rel
            .components()
            .fold(remote_root.to_string(), |acc, comp| {
                remote_path::join(&acc, &comp.as_os_str().to_string_lossy())
            });
        if entry.file_type().is_dir() {
            if !client.exists(&remote_child).await? {
                client.mkdir(&remote_child).await?;
            }
        } else {
            sink.send(TaskEvent::Text(format!("uploading {remote_child}")))
                .await;
            client.put(entry.path(), &remote_child).await?;
            *done += 1;
            report_progress(sink, *done, total).await;
        }
    }
    Ok(())
}

/// Count pre-pass (remote `list` fan-out) + recursive mirror download.
async fn run_download(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    task: &Task,
) -> FarmResult<String> {
    let mut total = 0usize;
    for item in &task.items {
        total += count_remote_files(client, &item.source).await?;
    }
    let mut done = 0usize;
    report_progress(sink, done, total).await;

    for item in &task.items {
        let stat = client.stat(&item.source).await?;
        if stat.is_dir {
            download_tree(client, sink, &item.source, Path::new(&item.dest), &mut done, total)
                .await?;
        } else {
            sink.send(TaskEvent::Text(format!("downloading {}", item.source)))
                .await;
            client.get(&item.source, Path::new(&item.dest)).await?;
            done += 1;
            report_progress(sink, done, total).await;
        }
    }
    Ok(format!("downloaded {done} file(s)"))
}

async fn download_tree(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    remote_root: &str,
    local_root: &Path,
    done: &mut usize,
    total: usize,
) -> FarmResult<()> {
    let mut stack = vec![(remote_root.to_string(), local_root.to_path_buf())];
    while let Some((remote_base, local_base)) = stack.pop() {
        tokio::fs::create_dir_all(&local_base)
            .await
            .map_err(|err| {
                FarmError::Task(format!("mkdir {} failed: {err}", local_base.display()))
            })?;
        for entry in client.list(&remote_base).await? {
            let remote_child = remote_path::join(&remote_base, &entry.name);
            let local_child = local_base.join(&entry.name);
            if entry.is_dir {
                stack.push((remote_child, local_child));
            } else {
                sink.send(TaskEvent::Text(format!("downloading {remote_child}")))
                    .await;
                client.get(&remote_child, &local_child).await?;
                *done += 1;
                report_progress(sink, *done, total).await;
            }
        }
    }
    Ok(())
}

/// Count pre-pass + depth-first deletion: children before their directory,
/// since a directory remove fails while non-empty.
async fn run_delete(
    client: &dyn RemoteFsPort,
    sink: &dyn TaskSink,
    task: &Task,
) -> FarmResult<String> {
    let mut total = 0usize;
    for item in &task.items {
        total += count_remote_files(client, &item.source).await?;
    }
    let mut done = 0usize;
    report_progress(sink, done, total).await;

    for item in &task.items {
        let stat = client.stat(&item.source).await?;
        if !stat.is_dir {
            sink.send(TaskEvent::Text(format!("deleting {}", item.source)))
                .await;
            client.remove(&item.source, false).await?;
            done += 1;
            report_progress(sink, done, total).await;
            continue;
        }
        // Preorder discovery; reversing it guarantees every directory is
        // removed after all of its descendants.
        let mut dirs: Vec<String> = Vec::new();
        let mut stack = vec![item.source.clone()];
        while let Some(cur) = stack.pop() {
            dirs.push(cur.clone());
            for entry in client.list(&cur).await? {
                let child = remote_path::join(&cur, &entry.name);
                if entry.is_dir {
                    stack.push(child);
                } else {
                    sink.send(TaskEvent::Text(format!("deleting {child}"))).await;
                    client.remove(&child, false).await?;
                    done += 1;
                    report_progress(sink, done, total).await;
                }
            }
        }
        for dir in dirs.iter().rev() {
            client.remove(dir, true).await?;
        }
    }
    Ok(format!("deleted {done} file(s)"))
}

fn count_local_files(path: &Path) -> usize {
    if path.is_file() {
        return 1;
    }
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

async fn count_remote_files(client: &dyn RemoteFsPort, path: &str) -> FarmResult<usize> {
    let stat = client.stat(path).await?;
    if !stat.is_dir {
        return Ok(1);
    }
    let mut count = 0usize;
    let mut stack = vec![path.to_string()];
    while let Some(cur) = stack.pop() {
        for entry in client.list(&cur).await? {
            if entry.is_dir {
                stack.push(remote_path::join(&cur, &entry.name));
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

async fn report_progress(sink: &dyn TaskSink, done: usize, total: usize) {
    sink.send(TaskEvent::Progress { done, total }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    use crate::app::types::{RemoteDirEntry, RemoteStat};

    /// In-memory remote filesystem with a call log, in the spirit of the
    /// fake executors used by the sync tests.
    #[derive(Default)]
    struct FakeRemoteFs {
        // path -> is_dir; file contents are irrelevant to the queue
        entries: Mutex<BTreeMap<String, bool>>,
        calls: Mutex<Vec<String>>,
        fail_on: Mutex<Vec<String>>,
    }

    impl FakeRemoteFs {
        fn with_entries(entries: &[(&str, bool)]) -> Self {
            let fs = Self::default();
            {
                let mut map = fs.entries.lock().unwrap();
                map.insert("/".to_string(), true);
                for (path, is_dir) in entries {
                    map.insert(path.to_string(), *is_dir);
                }
            }
            fs
        }

        fn fail_on(&self, call: &str) {
            self.fail_on.lock().unwrap().push(call.to_string());
        }

        fn log(&self, call: String) -> FarmResult<()> {
            self.calls.lock().unwrap().push(call.clone());
            if self.fail_on.lock().unwrap().iter().any(|f| *f == call) {
                return Err(FarmError::Task(format!("forced failure for {call}")));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn contains(&self, path: &str) -> bool {
            self.entries.lock().unwrap().contains_key(path)
        }
    }

    #[async_trait]
    impl RemoteFsPort for FakeRemoteFs {
        async fn stat(&self, path: &str) -> FarmResult<RemoteStat> {
            match self.entries.lock().unwrap().get(path) {
                Some(is_dir) => Ok(RemoteStat { is_dir: *is_dir }),
                None => Err(FarmError::NotFound(path.to_string())),
            }
        }

        async fn list(&self, path: &str) -> FarmResult<Vec<RemoteDirEntry>> {
            let prefix = if path == "/" {
                "/".to_string()
            } else {
                format!("{path}/")
            };
            let entries = self.entries.lock().unwrap();
            let mut out = Vec::new();
            for (candidate, is_dir) in entries.iter() {
                if let Some(rest) = candidate.strip_prefix(&prefix) {
                    if !rest.is_empty() && !rest.contains('/') {
                        out.push(RemoteDirEntry {
                            name: rest.to_string(),
                            is_dir: *is_dir,
                        });
                    }
                }
            }
            Ok(out)
        }

        async fn mkdir(&self, path: &str) -> FarmResult<()> {
            self.log(format!("mkdir:{path}"))?;
            self.entries.lock().unwrap().insert(path.to_string(), true);
            Ok(())
        }

        async fn remove(&self, path: &str, is_dir: bool) -> FarmResult<()> {
            self.log(format!("remove:{path}"))?;
            let mut entries = self.entries.lock().unwrap();
            if is_dir {
                let child_prefix = format!("{path}/");
                if entries.keys().any(|k| k.starts_with(&child_prefix)) {
                    return Err(FarmError::Task(format!("directory not empty: {path}")));
                }
            }
            entries
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| FarmError::NotFound(path.to_string()))
        }

        async fn rename(&self, old_path: &str, new_path: &str) -> FarmResult<()> {
            self.log(format!("rename:{old_path}->{new_path}"))?;
            let mut entries = self.entries.lock().unwrap();
            let is_dir = entries
                .remove(old_path)
                .ok_or_else(|| FarmError::NotFound(old_path.to_string()))?;
            entries.insert(new_path.to_string(), is_dir);
            Ok(())
        }

        async fn put(&self, _local_path: &Path, remote_path: &str) -> FarmResult<()> {
            self.log(format!("put:{remote_path}"))?;
            self.entries
                .lock()
                .unwrap()
                .insert(remote_path.to_string(), false);
            Ok(())
        }

        async fn get(&self, remote_path: &str, local_path: &Path) -> FarmResult<()> {
            self.log(format!("get:{remote_path}"))?;
            if !self.contains(remote_path) {
                return Err(FarmError::NotFound(remote_path.to_string()));
            }
            std::fs::write(local_path, b"payload")
                .map_err(|err| FarmError::Task(err.to_string()))?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TaskEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<TaskEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskSink for RecordingSink {
        async fn send(&self, event: TaskEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn tasks_complete_in_fifo_order() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[("/a", true), ("/b", true)]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let t1 = queue
            .enqueue(Task::mkdir("/a/one".to_string()))
            .unwrap();
        let t2 = queue
            .enqueue(Task::mkdir("/b/two".to_string()))
            .unwrap();
        let t3 = queue
            .enqueue(Task::rename("/a/one".to_string(), "/a/uno".to_string()))
            .unwrap();
        assert!(t1.wait().await.unwrap().success);
        assert!(t2.wait().await.unwrap().success);
        assert!(t3.wait().await.unwrap().success);

        assert_eq!(
            fs.calls(),
            vec![
                "mkdir:/a/one".to_string(),
                "mkdir:/b/two".to_string(),
                "rename:/a/one->/a/uno".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_task_is_isolated_and_queue_continues() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[]));
        fs.fail_on("mkdir:/broken");
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let bad = queue.enqueue(Task::mkdir("/broken".to_string())).unwrap();
        let good = queue.enqueue(Task::mkdir("/fine".to_string())).unwrap();

        let bad = bad.wait().await.unwrap();
        assert!(!bad.success);
        assert!(bad.message.contains("forced failure"));
        assert!(good.wait().await.unwrap().success);
        assert!(fs.contains("/fine"));

        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, TaskEvent::Error(detail) if detail.contains("forced failure"))));
        assert!(events.iter().any(|e| matches!(
            e,
            TaskEvent::Completed { kind: TaskKind::Mkdir, success: true, .. }
        )));
    }

    #[tokio::test]
    async fn mkdir_on_an_existing_path_is_reported_not_applied() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[("/proj", true)]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let outcome = queue
            .enqueue_blocking(Task::mkdir("/proj".to_string()))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("folder already exists"));
        // the guard short-circuits before any mkdir round-trip
        assert!(fs.calls().is_empty());

        // a fresh path still goes through afterwards
        let outcome = queue
            .enqueue_blocking(Task::mkdir("/proj2".to_string()))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(fs.contains("/proj2"));
    }

    #[tokio::test]
    async fn upload_mirrors_tree_and_counts_leaf_files() {
        let local = tempdir().unwrap();
        std::fs::create_dir_all(local.path().join("shots/s01")).unwrap();
        std::fs::write(local.path().join("scene.blend"), b"x").unwrap();
        std::fs::write(local.path().join("shots/s01/a.exr"), b"x").unwrap();
        std::fs::write(local.path().join("shots/s01/b.exr"), b"x").unwrap();

        let fs = Arc::new(FakeRemoteFs::with_entries(&[("/home", true), ("/home/alice", true)]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let outcome = queue
            .enqueue_blocking(Task::upload(vec![(
                local.path().to_string_lossy().into_owned(),
                "/home/alice/farm".to_string(),
            )]))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(fs.contains("/home/alice/farm/scene.blend"));
        assert!(fs.contains("/home/alice/farm/shots/s01/a.exr"));
        assert!(fs.contains("/home/alice/farm/shots/s01/b.exr"));

        // Pre-pass announced the total before any transfer; one bump per leaf.
        let progress: Vec<(usize, usize)> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Progress { done, total } => Some((*done, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress.first(), Some(&(0, 3)));
        assert_eq!(progress.last(), Some(&(3, 3)));
        assert_eq!(progress.len(), 4);
    }

    #[tokio::test]
    async fn delete_removes_children_before_directories() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[
            ("/proj", true),
            ("/proj/a.exr", false),
            ("/proj/sub", true),
            ("/proj/sub/b.exr", false),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let outcome = queue
            .enqueue_blocking(Task::delete(vec!["/proj".to_string()]))
            .await
            .unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert!(!fs.contains("/proj"));

        let removals: Vec<String> = fs
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("remove:"))
            .collect();
        let dir_pos = removals.iter().position(|c| c == "remove:/proj").unwrap();
        let sub_pos = removals.iter().position(|c| c == "remove:/proj/sub").unwrap();
        let leaf_pos = removals
            .iter()
            .position(|c| c == "remove:/proj/sub/b.exr")
            .unwrap();
        assert!(leaf_pos < sub_pos && sub_pos < dir_pos);
    }

    #[tokio::test]
    async fn download_recreates_tree_locally() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[
            ("/out", true),
            ("/out/f1.exr", false),
            ("/out/deep", true),
            ("/out/deep/f2.exr", false),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        let local = tempdir().unwrap();
        let dest = local.path().join("out");
        let outcome = queue
            .enqueue_blocking(Task::download(vec![(
                "/out".to_string(),
                dest.to_string_lossy().into_owned(),
            )]))
            .await
            .unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert!(dest.join("f1.exr").is_file());
        assert!(dest.join("deep/f2.exr").is_file());
    }

    #[tokio::test]
    async fn rename_round_trip_restores_original() {
        let fs = Arc::new(FakeRemoteFs::with_entries(&[("/a", false)]));
        let sink = Arc::new(RecordingSink::default());
        let queue = TaskQueue::spawn(fs.clone(), sink.clone());

        queue
            .enqueue_blocking(Task::rename("/a".to_string(), "/b".to_string()))
            .await
            .unwrap();
        assert!(!fs.contains("/a"));
        assert!(fs.contains("/b"));
        queue
            .enqueue_blocking(Task::rename("/b".to_string(), "/a".to_string()))
            .await
            .unwrap();
        assert!(fs.contains("/a"));
        assert!(!fs.contains("/b"));
    }
}
