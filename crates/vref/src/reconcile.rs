// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Attribute reconciliation across the files of one variable or dataset.
//!
//! Every contributing set must expose the same keys. A key whose values
//! agree is adopted. A key whose values disagree fails the reconciliation
//! unless the caller registered a [`ConflictRule`] for it (or a fallback
//! rule). No rule is applied by default.

use crate::attrs::{AttrValue, AttributeSet};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

/// Decides a key whose values disagree across inputs.
pub trait ConflictRule: Debug + Send + Sync {
    /// `values` are the distinct values in first-seen order (at least two).
    /// Returning `None` drops the key from the reconciled set.
    fn resolve(&self, key: &str, values: &[AttrValue]) -> Result<Option<AttrValue>>;
}

/// Keep the value from the first input
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferFirst;

impl ConflictRule for PreferFirst {
    fn resolve(&self, _key: &str, values: &[AttrValue]) -> Result<Option<AttrValue>> {
        Ok(values.first().cloned())
    }
}

/// Join distinct text values
#[derive(Debug, Clone)]
pub struct Concatenate {
    pub separator: String,
}

impl ConflictRule for Concatenate {
    fn resolve(&self, key: &str, values: &[AttrValue]) -> Result<Option<AttrValue>> {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            match value {
                AttrValue::Text(s) => parts.push(s.as_str()),
                _ => {
                    return Err(Error::AttributeValueConflict {
                        key: key.to_string(),
                        values: values.to_vec(),
                    });
                }
            }
        }
        Ok(Some(AttrValue::Text(parts.join(&self.separator))))
    }
}

/// Omit the key from the result
#[derive(Debug, Clone, Copy, Default)]
pub struct DropKey;

impl ConflictRule for DropKey {
    fn resolve(&self, _key: &str, _values: &[AttrValue]) -> Result<Option<AttrValue>> {
        Ok(None)
    }
}

/// Declarative form of the built-in rules, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    PreferFirst,
    Concatenate { separator: String },
    DropKey,
}

impl RuleSpec {
    pub fn build(&self) -> Arc<dyn ConflictRule> {
        match self {
            RuleSpec::PreferFirst => Arc::new(PreferFirst),
            RuleSpec::Concatenate { separator } => Arc::new(Concatenate {
                separator: separator.clone(),
            }),
            RuleSpec::DropKey => Arc::new(DropKey),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeReconciler {
    rules: BTreeMap<String, Arc<dyn ConflictRule>>,
    fallback: Option<Arc<dyn ConflictRule>>,
}

impl AttributeReconciler {
    /// Reconciler with no rules: any disagreement is an error.
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn from_specs(rules: &BTreeMap<String, RuleSpec>, fallback: Option<&RuleSpec>) -> Self {
        Self {
            rules: rules.iter().map(|(k, r)| (k.clone(), r.build())).collect(),
            fallback: fallback.map(RuleSpec::build),
        }
    }

    pub fn with_rule(mut self, key: &str, rule: impl ConflictRule + 'static) -> Self {
        _ = self.rules.insert(key.to_string(), Arc::new(rule));
        self
    }

    pub fn with_fallback(mut self, rule: impl ConflictRule + 'static) -> Self {
        self.fallback = Some(Arc::new(rule));
        self
    }

    pub fn is_strict(&self) -> bool {
        self.rules.is_empty() && self.fallback.is_none()
    }

    /// Reduce an ordered sequence of attribute sets to one.
    ///
    /// An empty input reconciles to an empty set.
    pub fn reconcile(&self, sets: &[AttributeSet]) -> Result<AttributeSet> {
        let Some(first) = sets.first() else {
            return Ok(AttributeSet::default());
        };

        let reference: BTreeSet<&String> = first.keys().collect();
        for (index, set) in sets.iter().enumerate().skip(1) {
            if set.scope != first.scope {
                return Err(Error::AttributeScopeMismatch {
                    index,
                    expected: first.scope.to_string(),
                    found: set.scope.to_string(),
                });
            }
            let keys: BTreeSet<&String> = set.keys().collect();
            if keys != reference {
                return Err(Error::AttributeKeySetMismatch {
                    index,
                    missing: reference.difference(&keys).map(|k| k.to_string()).collect(),
                    extra: keys.difference(&reference).map(|k| k.to_string()).collect(),
                });
            }
        }

        let mut out = AttributeSet::new(first.scope);
        for key in reference {
            let mut distinct: Vec<AttrValue> = Vec::new();
            for set in sets {
                if let Some(value) = set.get(key) {
                    if !distinct.contains(value) {
                        distinct.push(value.clone());
                    }
                }
            }
            let resolved = if distinct.len() == 1 {
                distinct.pop()
            } else {
                let rule = self
                    .rules
                    .get(key.as_str())
                    .or(self.fallback.as_ref())
                    .ok_or_else(|| Error::AttributeValueConflict {
                        key: key.clone(),
                        values: distinct.clone(),
                    })?;
                rule.resolve(key, &distinct)?
            };
            if let Some(value) = resolved {
                _ = out.insert(key, value);
            }
        }
        Ok(out)
    }
}
