// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::remote_path;

/// Connection parameters supplied by the (external) credential store.
/// This crate never persists or encrypts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Canonical remote layout. Two parallel namespaces mirror the same tree:
/// `{root}/{user}/...` is what the artist browses and mutates over SFTP,
/// `{render_root}/{user}/...` is how the scheduler's workers see the same
/// paths. Job and output paths are rewritten from the former to the latter at
/// build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmLayout {
    pub root: String,
    pub render_root: String,
    pub farm_dir: String,
    pub output_dir: String,
    pub project_dir: String,
    pub package_dir: String,
}

impl FarmLayout {
    pub fn home_root(&self, user: &str) -> String {
        remote_path::join(&self.root, user)
    }

    /// The browsable subtree: `{root}/{user}/{farm_dir}`.
    pub fn farm_root(&self, user: &str) -> String {
        remote_path::join(&self.home_root(user), &self.farm_dir)
    }

    pub fn output_root(&self, user: &str) -> String {
        remote_path::join(&self.farm_root(user), &self.output_dir)
    }

    pub fn project_root(&self, user: &str) -> String {
        remote_path::join(&self.farm_root(user), &self.project_dir)
    }

    /// Hidden directory holding the helper-script payload, replaced wholesale
    /// on every successful bootstrap.
    pub fn package_root(&self, user: &str) -> String {
        remote_path::join(&self.home_root(user), &self.package_dir)
    }

    /// Rewrite a home-namespace path into the render namespace used by the
    /// scheduler's workers. `None` when the path is not under `root`.
    pub fn to_render_namespace(&self, path: &str) -> Option<String> {
        remote_path::rewrite_root(path, &self.root, &self.render_root)
    }
}

impl Default for FarmLayout {
    fn default() -> Self {
        Self {
            root: "/home".to_string(),
            render_root: "/render".to_string(),
            farm_dir: "farm".to_string(),
            output_dir: "output".to_string(),
            project_dir: "projects".to_string(),
            package_dir: ".farmlink".to_string(),
        }
    }
}

/// Result of a remote `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_dir: bool,
}

/// One entry of a remote directory listing. The SFTP readdir reply already
/// carries attributes, so the kind rides along with the name and spares a
/// stat fan-out during tree population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Upload,
    Download,
    Delete,
    Rename,
    Mkdir,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Upload => "upload",
            TaskKind::Download => "download",
            TaskKind::Delete => "delete",
            TaskKind::Rename => "rename",
            TaskKind::Mkdir => "mkdir",
        };
        f.write_str(name)
    }
}

/// One `(source, destination)` pair of a task. Upload sources and download
/// destinations are local paths; everything else is a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub source: String,
    pub dest: String,
}

/// One queued mutating operation. Items are processed in sequence order;
/// queue position and lifecycle state are implicit in the queue channel
/// (FIFO) and the terminal outcome reported per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub items: Vec<TaskItem>,
}

impl Task {
    pub fn upload(pairs: Vec<(String, String)>) -> Self {
        Self::with_pairs(TaskKind::Upload, pairs)
    }

    pub fn download(pairs: Vec<(String, String)>) -> Self {
        Self::with_pairs(TaskKind::Download, pairs)
    }

    pub fn delete(paths: Vec<String>) -> Self {
        Self {
            kind: TaskKind::Delete,
            items: paths
                .into_iter()
                .map(|p| TaskItem {
                    source: p.clone(),
                    dest: p,
                })
                .collect(),
        }
    }

    pub fn rename(old_path: String, new_path: String) -> Self {
        Self::with_pairs(TaskKind::Rename, vec![(old_path, new_path)])
    }

    pub fn mkdir(path: String) -> Self {
        Self {
            kind: TaskKind::Mkdir,
            items: vec![TaskItem {
                source: path.clone(),
                dest: path,
            }],
        }
    }

    fn with_pairs(kind: TaskKind, pairs: Vec<(String, String)>) -> Self {
        Self {
            kind,
            items: pairs
                .into_iter()
                .map(|(source, dest)| TaskItem { source, dest })
                .collect(),
        }
    }
}

/// One frame work item of a job's agenda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTask {
    pub frame: i64,
    pub name: String,
}

/// The normalized unit submitted to the external scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub cpu_count: u32,
    pub working_directory: String,
    pub environment: BTreeMap<String, String>,
    pub command_line: String,
    pub agenda: Vec<FrameTask>,
}
