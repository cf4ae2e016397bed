// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod bootstrap;
pub mod job;
pub mod queue;
pub mod tree;
