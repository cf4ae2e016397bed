// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod adapters;
pub mod app;
pub mod config;
pub mod logging;
pub mod util;

pub use app::errors::{FarmError, FarmResult};
pub use app::services::bootstrap::{Bootstrapper, FarmSession};
pub use app::services::queue::TaskQueue;
pub use app::services::tree::VirtualTree;
pub use app::types::{Credentials, FarmLayout, JobDescriptor, Task, TaskKind};
