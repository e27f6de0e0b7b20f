// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Materialised coordinate values

use crate::attrs::AttrValue;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CoordinateValue {
    Timestamp(DateTime<Utc>),
    Int(i64),
    Float(#[serde(with = "crate::float")] f64),
}

impl CoordinateValue {
    fn type_name(&self) -> &'static str {
        match self {
            CoordinateValue::Timestamp(_) => "timestamp",
            CoordinateValue::Int(_) => "int",
            CoordinateValue::Float(_) => "float",
        }
    }

    /// Ordering between values of the same type; `None` across types or
    /// for `NaN`.
    pub fn partial_order(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (CoordinateValue::Timestamp(a), CoordinateValue::Timestamp(b)) => Some(a.cmp(b)),
            (CoordinateValue::Int(a), CoordinateValue::Int(b)) => Some(a.cmp(b)),
            (CoordinateValue::Float(a), CoordinateValue::Float(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl PartialEq for CoordinateValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CoordinateValue::Float(a), CoordinateValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self.partial_order(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for CoordinateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            CoordinateValue::Int(v) => write!(f, "{v}"),
            CoordinateValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Named, ordered coordinate values for one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateAxis {
    pub name: String,
    pub values: Vec<CoordinateValue>,
}

impl CoordinateAxis {
    /// Build an axis, rejecting values of mixed types.
    pub fn new(name: impl Into<String>, values: Vec<CoordinateValue>) -> Result<Self> {
        let name = name.into();
        if let Some(first) = values.first() {
            let kind = first.type_name();
            if values.iter().any(|v| v.type_name() != kind) {
                return Err(Error::MixedCoordinateTypes { axis: name });
            }
        }
        Ok(Self { name, values })
    }

    /// Materialise an axis from a loaded sequence attribute value.
    pub fn from_loaded(name: impl Into<String>, values: &AttrValue) -> Result<Self> {
        let name = name.into();
        let values = match values {
            AttrValue::Int(v) => vec![CoordinateValue::Int(*v)],
            AttrValue::Float(v) => vec![CoordinateValue::Float(*v)],
            AttrValue::IntList(v) => v.iter().copied().map(CoordinateValue::Int).collect(),
            AttrValue::FloatList(v) => v.iter().copied().map(CoordinateValue::Float).collect(),
            other => {
                return Err(Error::ShapeMismatch {
                    variable: name,
                    detail: format!("{} values cannot form a coordinate axis", other.type_name()),
                });
            }
        };
        Ok(Self { name, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of the first value that does not strictly increase over
    /// its predecessor, if any.
    pub fn first_non_increasing(&self) -> Option<usize> {
        if let Some(i) = self
            .values
            .iter()
            .position(|v| matches!(v, CoordinateValue::Float(f) if f.is_nan()))
        {
            return Some(i);
        }
        self.values
            .windows(2)
            .position(|w| w[0].partial_order(&w[1]) != Some(Ordering::Less))
            .map(|i| i + 1)
    }

    /// Fails with `AxisNotMonotonic` unless values strictly increase.
    pub fn require_strictly_increasing(&self) -> Result<()> {
        match self.first_non_increasing() {
            Some(position) => Err(Error::AxisNotMonotonic {
                axis: self.name.clone(),
                position,
            }),
            None => Ok(()),
        }
    }
}
