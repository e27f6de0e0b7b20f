// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-file coordinate values and the appendable dimension they index

use crate::attrs::{AttrValue, AttributeSet};
use crate::coords::{CoordinateAxis, CoordinateValue};
use crate::error::{Error, Result};
use crate::manifest::VirtualArrayManifest;
use crate::source::SourceFile;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How a raw per-file scalar becomes a coordinate value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateRule {
    /// `YYYYMM` integer, e.g. `195101`, as the first instant of that month (UTC)
    YearMonth,

    /// chrono format string applied to the textual form of the value
    Format(String),

    /// Integer used as-is
    Integer,
}

impl CoordinateRule {
    fn apply(&self, raw: &AttrValue) -> std::result::Result<CoordinateValue, String> {
        match self {
            CoordinateRule::YearMonth => {
                let ym = raw
                    .as_integer()
                    .ok_or_else(|| format!("{} is not an integer", raw.type_name()))?;
                let date = NaiveDate::parse_from_str(&format!("{ym}01"), "%Y%m%d")
                    .map_err(|e| e.to_string())?;
                Ok(CoordinateValue::Timestamp(
                    date.and_hms_opt(0, 0, 0)
                        .ok_or_else(|| "midnight out of range".to_string())?
                        .and_utc(),
                ))
            }
            CoordinateRule::Format(format) => {
                let text = match raw {
                    AttrValue::Text(s) => s.trim().to_string(),
                    other => other
                        .as_integer()
                        .map(|v| v.to_string())
                        .ok_or_else(|| format!("{} has no textual form", other.type_name()))?,
                };
                if let Ok(ts) = NaiveDateTime::parse_from_str(&text, format) {
                    return Ok(CoordinateValue::Timestamp(ts.and_utc()));
                }
                // Month-resolution formats such as "%Y%m" name the first day.
                let date = NaiveDate::parse_from_str(&text, format)
                    .or_else(|e| {
                        NaiveDate::parse_from_str(&format!("{text}01"), &format!("{format}%d"))
                            .map_err(|_| e)
                    })
                    .map_err(|e| e.to_string())?;
                Ok(CoordinateValue::Timestamp(
                    date.and_hms_opt(0, 0, 0)
                        .ok_or_else(|| "midnight out of range".to_string())?
                        .and_utc(),
                ))
            }
            CoordinateRule::Integer => raw
                .as_integer()
                .map(CoordinateValue::Int)
                .ok_or_else(|| format!("{} is not an integer", raw.type_name())),
        }
    }
}

/// Turns one field of every source file into one value along a new
/// leading dimension.
///
/// The field is consumed: it does not survive as a variable or coordinate
/// of the expanded manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateDeriver {
    pub field: String,
    pub dimension: String,
    pub rule: CoordinateRule,
}

impl CoordinateDeriver {
    pub fn new(field: impl Into<String>, dimension: impl Into<String>, rule: CoordinateRule) -> Self {
        Self {
            field: field.into(),
            dimension: dimension.into(),
            rule,
        }
    }

    pub fn derive(&self, source_url: &str, raw: &AttrValue) -> Result<CoordinateValue> {
        self.rule.apply(raw).map_err(|reason| Error::CoordinateParseError {
            source_url: source_url.to_string(),
            field: self.field.clone(),
            raw: raw.to_string(),
            reason,
        })
    }

    /// Look the field up among the file's loaded variables, then its
    /// global attributes.
    pub fn derive_from(&self, source: &SourceFile) -> Result<CoordinateValue> {
        let raw = source
            .loaded
            .get(&self.field)
            .map(|l| &l.values)
            .or_else(|| source.attributes.get(&self.field))
            .ok_or_else(|| Error::MissingField {
                source_url: source.url.clone(),
                field: self.field.clone(),
            })?;
        self.derive(&source.url, raw)
    }

    /// Field dropped from every file
    pub fn consumes(&self) -> &str {
        &self.field
    }

    /// File attributes without the consumed field, which varies per file
    /// and is carried by the new axis instead.
    pub fn retained_attributes(&self, source: &SourceFile) -> AttributeSet {
        let mut attributes = source.attributes.clone();
        _ = attributes.entries.remove(&self.field);
        attributes
    }

    /// Dimension prepended to every data variable
    pub fn introduces(&self) -> &str {
        &self.dimension
    }

    /// Reshape one file's manifest to length one along the new dimension.
    pub fn expand(&self, manifest: &VirtualArrayManifest) -> Result<VirtualArrayManifest> {
        let mut expanded = manifest.expand_leading(&self.dimension)?;
        _ = expanded.coordinates.remove(&self.field);
        Ok(expanded)
    }

    pub fn axis(&self, values: Vec<CoordinateValue>) -> Result<CoordinateAxis> {
        CoordinateAxis::new(self.dimension.as_str(), values)
    }
}
