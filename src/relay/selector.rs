// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Object filters for list and watch requests
//!
//! A [`Selector`] combines the namespace/name taken from the request path with
//! the `fieldSelector` and `labelSelector` query parameters.
//!
//! ## Supported syntax
//!
//! - Field selectors: `metadata.name` and `metadata.namespace` with `=`, `==`
//!   and `!=`, comma-separated
//! - Label selectors: equality-based only: `key=value`, `key==value`,
//!   `key!=value`, `key` (exists) and `!key` (does not exist)

use serde_json::Value;
use thiserror::Error;

/// Fields that can be used in a field selector
pub const SUPPORTED_FIELDS: &[&str] = &["metadata.name", "metadata.namespace"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid field selector '{0}'")]
    InvalidFieldSelector(String),
    #[error("field '{0}' is not supported in field selectors")]
    UnsupportedField(String),
    #[error("invalid label selector '{0}'")]
    InvalidLabelSelector(String),
}

/// Represents a field selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelectorOperator {
    /// Equals operator (=)
    Equals,
    /// Not equals operator (!=)
    NotEquals,
}

/// A single `path=value` / `path!=value` requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    /// Field path in Kubernetes notation (e.g., "metadata.name")
    pub path: String,
    pub operator: FieldSelectorOperator,
    pub value: String,
}

impl FieldSelector {
    fn matches(&self, object: &Value) -> bool {
        let actual = match self.path.as_str() {
            "metadata.name" => meta_str(object, "name"),
            "metadata.namespace" => meta_str(object, "namespace"),
            _ => None,
        }
        .unwrap_or("");

        match self.operator {
            FieldSelectorOperator::Equals => actual == self.value,
            FieldSelectorOperator::NotEquals => actual != self.value,
        }
    }
}

/// A single equality-based label requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

impl LabelRequirement {
    fn matches(&self, object: &Value) -> bool {
        let label = |key: &str| {
            object
                .pointer("/metadata/labels")
                .and_then(|labels| labels.get(key))
                .and_then(Value::as_str)
        };

        match self {
            LabelRequirement::Equals(key, value) => label(key) == Some(value.as_str()),
            LabelRequirement::NotEquals(key, value) => label(key) != Some(value.as_str()),
            LabelRequirement::Exists(key) => label(key).is_some(),
            LabelRequirement::NotExists(key) => label(key).is_none(),
        }
    }
}

/// Filter applied to every object a request returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub fields: Vec<FieldSelector>,
    pub labels: Vec<LabelRequirement>,
}

impl Selector {
    /// Match everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add requirements from `fieldSelector` / `labelSelector` query values
    pub fn with_query(
        mut self,
        field_selector: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Self, SelectorError> {
        if let Some(fields) = field_selector {
            self.fields = parse_field_selector(fields)?;
        }
        if let Some(labels) = label_selector {
            self.labels = parse_label_selector(labels)?;
        }
        Ok(self)
    }

    pub fn matches(&self, object: &Value) -> bool {
        if let Some(namespace) = &self.namespace
            && meta_str(object, "namespace") != Some(namespace.as_str())
        {
            return false;
        }
        if let Some(name) = &self.name
            && meta_str(object, "name") != Some(name.as_str())
        {
            return false;
        }
        self.fields.iter().all(|f| f.matches(object)) && self.labels.iter().all(|l| l.matches(object))
    }
}

fn meta_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get("metadata")?.get(field)?.as_str()
}

/// Parse `metadata.name=foo,metadata.namespace!=bar`
pub fn parse_field_selector(input: &str) -> Result<Vec<FieldSelector>, SelectorError> {
    let mut selectors = Vec::new();

    for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (path, operator, value) = if let Some((path, value)) = term.split_once("!=") {
            (path, FieldSelectorOperator::NotEquals, value)
        } else if let Some((path, value)) = term.split_once("==") {
            (path, FieldSelectorOperator::Equals, value)
        } else if let Some((path, value)) = term.split_once('=') {
            (path, FieldSelectorOperator::Equals, value)
        } else {
            return Err(SelectorError::InvalidFieldSelector(term.to_string()));
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(SelectorError::InvalidFieldSelector(term.to_string()));
        }
        if !SUPPORTED_FIELDS.contains(&path) {
            return Err(SelectorError::UnsupportedField(path.to_string()));
        }

        selectors.push(FieldSelector {
            path: path.to_string(),
            operator,
            value: value.trim().to_string(),
        });
    }

    Ok(selectors)
}

/// Parse `app=web,tier!=cache,canary,!legacy`
pub fn parse_label_selector(input: &str) -> Result<Vec<LabelRequirement>, SelectorError> {
    let mut requirements = Vec::new();

    for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let invalid = || SelectorError::InvalidLabelSelector(term.to_string());

        let requirement = if let Some((key, value)) = term.split_once("!=") {
            LabelRequirement::NotEquals(label_key(key).ok_or_else(invalid)?, value.trim().to_string())
        } else if let Some((key, value)) = term.split_once("==") {
            LabelRequirement::Equals(label_key(key).ok_or_else(invalid)?, value.trim().to_string())
        } else if let Some((key, value)) = term.split_once('=') {
            LabelRequirement::Equals(label_key(key).ok_or_else(invalid)?, value.trim().to_string())
        } else if let Some(key) = term.strip_prefix('!') {
            LabelRequirement::NotExists(label_key(key).ok_or_else(invalid)?)
        } else {
            LabelRequirement::Exists(label_key(term).ok_or_else(invalid)?)
        };

        requirements.push(requirement);
    }

    Ok(requirements)
}

fn label_key(key: &str) -> Option<String> {
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    valid.then(|| key.to_string())
}
