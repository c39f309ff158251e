// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use thiserror::Error;

use super::selector::SelectorError;

/// Per-request failures of a relay read
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream for {resource} is unavailable: {reason}")]
    UpstreamUnavailable { resource: String, reason: String },

    #[error("too old resource version: {requested} ({current})")]
    Expired { requested: String, current: String },

    #[error("invalid resourceVersion '{0}'")]
    InvalidVersion(String),

    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),

    #[error("{resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },
}

impl RelayError {
    /// HTTP status code for this error
    pub fn code(&self) -> u16 {
        match self {
            RelayError::UpstreamUnavailable { .. } => 502,
            RelayError::Expired { .. } => 410,
            RelayError::InvalidVersion(_) | RelayError::InvalidSelector(_) => 400,
            RelayError::NotFound { .. } => 404,
        }
    }

    /// Machine-readable reason, as used in Kubernetes `Status` objects
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::UpstreamUnavailable { .. } => "ServiceUnavailable",
            RelayError::Expired { .. } => "Expired",
            RelayError::InvalidVersion(_) | RelayError::InvalidSelector(_) => "BadRequest",
            RelayError::NotFound { .. } => "NotFound",
        }
    }

    pub fn to_status(&self) -> Status {
        Status {
            code: Some(i32::from(self.code())),
            message: Some(self.to_string()),
            reason: Some(self.reason().to_string()),
            status: Some("Failure".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_status() {
        let err = RelayError::Expired {
            requested: "3".to_string(),
            current: "90".to_string(),
        };
        let status = err.to_status();
        assert_eq!(status.code, Some(410));
        assert_eq!(status.reason.as_deref(), Some("Expired"));
        assert_eq!(status.status.as_deref(), Some("Failure"));
        assert_eq!(
            status.message.as_deref(),
            Some("too old resource version: 3 (90)")
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(RelayError::InvalidVersion("x".to_string()).code(), 400);
        assert_eq!(
            RelayError::from(SelectorError::InvalidLabelSelector("=".to_string())).code(),
            400
        );
        assert_eq!(
            RelayError::NotFound {
                resource: "services".to_string(),
                name: "web".to_string()
            }
            .code(),
            404
        );
        assert_eq!(
            RelayError::UpstreamUnavailable {
                resource: "services/v1".to_string(),
                reason: "syncing".to_string()
            }
            .code(),
            502
        );
    }
}
