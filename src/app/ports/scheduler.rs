// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::errors::FarmResult;
use crate::app::types::JobDescriptor;

/// Job id handed back by the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub id: i64,
}

/// The external batch scheduler's submission API, injected at construction.
/// Submission is an opaque remote call: no retry here, failures surface
/// verbatim as `FarmError::Submission`.
#[async_trait]
pub trait SchedulerPort: Send + Sync {
    async fn submit(&self, descriptor: &JobDescriptor) -> FarmResult<Vec<SubmittedJob>>;
}
