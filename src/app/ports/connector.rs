// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use std::sync::Arc;

use crate::app::errors::FarmResult;
use crate::app::ports::RemoteFsPort;
use crate::app::types::Credentials;

/// One connection attempt. The bootstrapper drives the retry loop on top of
/// this seam, so it can be exercised against fakes.
///
/// Implementations distinguish `FarmError::InvalidCredentials` (terminal,
/// never retried) from `FarmError::Connection` (retried up to the attempt
/// limit).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> FarmResult<Arc<dyn RemoteFsPort>>;
}
