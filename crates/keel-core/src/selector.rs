//! Label selectors for config fragment targeting.
//!
//! A cut-down form of Kubernetes label selectors: exact-match labels
//! plus set-based requirements (`In`, `NotIn`, `Exists`, `DoesNotExist`).
//! Unknown operators are a hard error at match time, never silently
//! treated as non-matching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from evaluating a label selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("unknown selector operator {0:?} for key {1:?}")]
    UnknownOperator(String, String),

    #[error("operator {0:?} on key {1:?} requires at least one value")]
    MissingValues(String, String),

    #[error("operator {0:?} on key {1:?} takes no values")]
    UnexpectedValues(String, String),
}

/// A label selector: all match-labels and all requirements must hold.
///
/// An empty selector matches every label set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<SelectorRequirement>,
}

/// One set-based requirement within a selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorRequirement {
    pub key: String,
    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`.
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelSelector {
    /// Evaluate this selector against a label set.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, SelectorError> {
        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }

        for req in &self.match_expressions {
            if !req.matches(labels)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl SelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, SelectorError> {
        match self.operator.as_str() {
            "In" => {
                if self.values.is_empty() {
                    return Err(SelectorError::MissingValues(
                        self.operator.clone(),
                        self.key.clone(),
                    ));
                }
                Ok(labels
                    .get(&self.key)
                    .is_some_and(|v| self.values.contains(v)))
            }
            "NotIn" => {
                if self.values.is_empty() {
                    return Err(SelectorError::MissingValues(
                        self.operator.clone(),
                        self.key.clone(),
                    ));
                }
                Ok(labels
                    .get(&self.key)
                    .is_none_or(|v| !self.values.contains(v)))
            }
            "Exists" => {
                if !self.values.is_empty() {
                    return Err(SelectorError::UnexpectedValues(
                        self.operator.clone(),
                        self.key.clone(),
                    ));
                }
                Ok(labels.contains_key(&self.key))
            }
            "DoesNotExist" => {
                if !self.values.is_empty() {
                    return Err(SelectorError::UnexpectedValues(
                        self.operator.clone(),
                        self.key.clone(),
                    ));
                }
                Ok(!labels.contains_key(&self.key))
            }
            other => Err(SelectorError::UnknownOperator(
                other.to_string(),
                self.key.clone(),
            )),
        }
    }
}
