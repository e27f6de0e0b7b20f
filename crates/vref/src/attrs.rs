// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Typed attribute dictionaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value: a scalar or a homogeneous sequence.
///
/// Floats compare by bit pattern so that two sources carrying the same
/// `NaN` fill value agree with each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Float(#[serde(with = "crate::float")] f64),
    Bool(bool),
    TextList(Vec<String>),
    IntList(Vec<i64>),
    FloatList(#[serde(with = "crate::float::list")] Vec<f64>),
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Text(a), AttrValue::Text(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::TextList(a), AttrValue::TextList(b)) => a == b,
            (AttrValue::IntList(a), AttrValue::IntList(b)) => a == b,
            (AttrValue::FloatList(a), AttrValue::FloatList(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Text(_) => "text",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::TextList(_) => "text_list",
            AttrValue::IntList(_) => "int_list",
            AttrValue::FloatList(_) => "float_list",
        }
    }

    /// The value as a single integer, accepting integral floats and
    /// decimal text.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::IntList(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttrValue::TextList(v) => v.len(),
            AttrValue::IntList(v) => v.len(),
            AttrValue::FloatList(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(v) => write!(f, "{v:?}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::TextList(v) => write!(f, "{v:?}"),
            AttrValue::IntList(v) => write!(f, "{v:?}"),
            AttrValue::FloatList(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Where an attribute set was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrScope {
    File,
    #[default]
    Variable,
    Dataset,
}

impl fmt::Display for AttrScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrScope::File => "file",
            AttrScope::Variable => "variable",
            AttrScope::Dataset => "dataset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(default)]
    pub scope: AttrScope,
    #[serde(default)]
    pub entries: BTreeMap<String, AttrValue>,
}

impl AttributeSet {
    pub fn new(scope: AttrScope) -> Self {
        Self {
            scope,
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.entries.insert(key.to_string(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same set under a different scope
    pub fn rescoped(mut self, scope: AttrScope) -> Self {
        self.scope = scope;
        self
    }
}
