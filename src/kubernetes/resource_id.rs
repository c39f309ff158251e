// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource identifiers parsed from short textual specs
//!
//! Spec format: `resource[.group][/version]`
//! - `services` → core group, v1
//! - `endpointslices.discovery.k8s.io` → group `discovery.k8s.io`, v1
//! - `deployments.apps/v1` → group `apps`, version `v1`

use std::fmt;

use thiserror::Error;

/// Version used when the spec does not name one
pub const DEFAULT_VERSION: &str = "v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceIdError {
    #[error("empty resource spec")]
    Empty,
    #[error("resource spec '{0}' has no resource name")]
    MissingResource(String),
    #[error("resource spec '{0}' has an empty version")]
    MissingVersion(String),
}

/// Immutable (group, version, resource) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// API group (empty string for the core group)
    pub group: String,
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl ResourceId {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Parse a spec like `endpointslices.discovery.k8s.io/v1`
    pub fn parse(spec: &str) -> Result<Self, ResourceIdError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ResourceIdError::Empty);
        }

        let (rest, version) = match spec.split_once('/') {
            Some((rest, version)) => (rest, version),
            None => (spec, DEFAULT_VERSION),
        };
        if version.is_empty() {
            return Err(ResourceIdError::MissingVersion(spec.to_string()));
        }

        let (resource, group) = rest.split_once('.').unwrap_or((rest, ""));
        if resource.is_empty() {
            return Err(ResourceIdError::MissingResource(spec.to_string()));
        }

        Ok(Self::new(group, version, resource))
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// `v1` for the core group, `group/version` otherwise
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// URL prefix for this resource's group/version (`/api/v1`, `/apis/apps/v1`)
    pub fn path_prefix(&self) -> String {
        if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.resource, self.version)
        } else {
            write!(f, "{}.{}/{}", self.resource, self.group, self.version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_core_resource() {
        let id = ResourceId::parse("services").unwrap();
        assert_eq!(id, ResourceId::new("", "v1", "services"));
        assert!(id.is_core());
        assert_eq!(id.api_version(), "v1");
        assert_eq!(id.path_prefix(), "/api/v1");
    }

    #[test]
    fn test_parse_grouped_resource() {
        let id = ResourceId::parse("endpointslices.discovery.k8s.io").unwrap();
        assert_eq!(id.group, "discovery.k8s.io");
        assert_eq!(id.version, "v1");
        assert_eq!(id.resource, "endpointslices");
        assert_eq!(id.api_version(), "discovery.k8s.io/v1");
        assert_eq!(id.path_prefix(), "/apis/discovery.k8s.io/v1");
    }

    #[test]
    fn test_parse_explicit_version() {
        let id = ResourceId::parse("horizontalpodautoscalers.autoscaling/v2").unwrap();
        assert_eq!(id, ResourceId::new("autoscaling", "v2", "horizontalpodautoscalers"));

        let core = ResourceId::parse("configmaps/v1").unwrap();
        assert_eq!(core, ResourceId::new("", "v1", "configmaps"));
    }

    #[test]
    fn test_parse_rejects_malformed_specs() {
        assert_eq!(ResourceId::parse("  "), Err(ResourceIdError::Empty));
        assert!(matches!(
            ResourceId::parse(".apps"),
            Err(ResourceIdError::MissingResource(_))
        ));
        assert!(matches!(
            ResourceId::parse("deployments.apps/"),
            Err(ResourceIdError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for spec in ["services/v1", "deployments.apps/v1", "endpointslices.discovery.k8s.io/v1"] {
            let id = ResourceId::parse(spec).unwrap();
            assert_eq!(id.to_string(), spec);
            assert_eq!(ResourceId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
