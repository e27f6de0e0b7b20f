// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Expected variable names, derived from where a file lives

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum VariableNaming {
    /// `.../RZSM/file_195101.nc` names `RZSM`
    #[default]
    ParentDirectory,

    /// `.../RZSM_195101.nc` names `RZSM` with separator `_`
    FileStemPrefix { separator: String },
}

impl VariableNaming {
    pub fn expected_name(&self, locator: &str) -> Result<String> {
        let invalid = |reason: &str| Error::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };
        let path = locator
            .split_once("://")
            .map_or(locator, |(_, rest)| rest)
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let name = match self {
            VariableNaming::ParentDirectory => {
                if segments.len() < 2 {
                    return Err(invalid("no parent directory"));
                }
                segments[segments.len() - 2]
            }
            VariableNaming::FileStemPrefix { separator } => {
                let file = segments.last().ok_or_else(|| invalid("no file name"))?;
                let stem = file.rsplit_once('.').map_or(*file, |(stem, _)| stem);
                stem.split(separator.as_str()).next().unwrap_or_default()
            }
        };
        if name.is_empty() {
            return Err(invalid("empty variable name"));
        }
        Ok(name.to_string())
    }
}

/// How declared and expected variable names are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePolicy {
    /// Names must be identical
    #[default]
    Exact,

    /// Names may differ in ASCII case; the expected name wins
    Insensitive,
}

impl CasePolicy {
    pub fn matches(&self, expected: &str, declared: &str) -> bool {
        match self {
            CasePolicy::Exact => expected == declared,
            CasePolicy::Insensitive => expected.eq_ignore_ascii_case(declared),
        }
    }
}
