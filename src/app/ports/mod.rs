// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

mod connector;
mod remote_fs;
mod scheduler;
mod task_events;

pub use connector::Connector;
pub use remote_fs::RemoteFsPort;
pub use scheduler::{SchedulerPort, SubmittedJob};
pub use task_events::{NoopSink, TaskEvent, TaskSink};
