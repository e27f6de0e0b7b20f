// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Reset hook for state kept by external header decoders between
//! variables.
//!
//! Some decoding libraries keep per-process scratch files that go stale
//! once a variable's files have been read. The pipeline calls
//! [`TransientCache::reset`] before each variable. This is a workaround
//! for those libraries and plays no part in manifest correctness.

use crate::{Result, StewardError};
use std::fmt;
use std::path::{Path, PathBuf};

pub trait TransientCache: fmt::Debug + Send + Sync {
    fn reset(&self) -> Result<()>;
}

/// Nothing to reset
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransientCache;

impl TransientCache for NoTransientCache {
    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// A scratch directory emptied on every reset
#[derive(Debug, Clone)]
pub struct ScratchDirectory {
    path: PathBuf,
}

impl ScratchDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TransientCache for ScratchDirectory {
    fn reset(&self) -> Result<()> {
        let failed = |source| StewardError::CacheReset {
            path: self.path.display().to_string(),
            source,
        };
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path).map_err(failed)?;
        }
        std::fs::create_dir_all(&self.path).map_err(failed)?;
        let path = self.path.display().to_string();
        diagnostics::info!("reset transient cache {path}", path: path.as_str());
        Ok(())
    }
}
