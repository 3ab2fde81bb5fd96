// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`ferry-core`)
//!
//! Browser-facing rendering. **No fleet logic lives here**; endpoints in `crate::application`
//! decide what to show and call into these helpers to produce HTML.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pages`] | Manifest, host status, agent page, redirect and error pages |

pub mod pages;
