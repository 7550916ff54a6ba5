//! AWS delete-error classification
//!
//! Maps AWS SDK error codes onto [`DeleteErrorKind`] using
//! `ProvideErrorMetadata::code()` rather than string matching on debug
//! output. The teardown orchestrator only distinguishes in-use, not-found,
//! and everything else.

use crate::gateway::DeleteError;
use aws_sdk_ec2::error::ProvideErrorMetadata;

/// Codes meaning the provider still holds a reference (retryable).
const IN_USE_CODES: &[&str] = &["DependencyViolation", "ResourceInUse", "ResourceInUseException"];

/// Codes meaning the resource is already gone (idempotent success).
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidInstanceID.NotFound",
    "InvalidAssociationID.NotFound",
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
    "ListenerNotFound",
];

/// Classify an AWS error code into a [`DeleteError`].
pub fn classify_delete(code: Option<&str>, message: Option<&str>) -> DeleteError {
    let message = match (code, message) {
        (Some(c), Some(m)) => format!("{c}: {m}"),
        (Some(c), None) => c.to_string(),
        (None, Some(m)) => m.to_string(),
        (None, None) => "unknown AWS error".to_string(),
    };
    match code {
        Some(c) if IN_USE_CODES.contains(&c) => DeleteError::in_use(message),
        Some(c) if NOT_FOUND_CODES.contains(&c) => DeleteError::not_found(message),
        _ => DeleteError::other(message),
    }
}

/// Classify a typed SDK error (works for any operation error carrying
/// metadata, across both the EC2 and ELBv2 clients).
pub fn sdk_delete_error<E: ProvideErrorMetadata>(err: &E) -> DeleteError {
    classify_delete(err.code(), err.message())
}

/// True when the error code says the resource no longer exists.
pub fn is_not_found<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.code().is_some_and(|c| NOT_FOUND_CODES.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::DeleteErrorKind;

    #[test]
    fn dependency_violation_is_in_use() {
        let err = classify_delete(Some("DependencyViolation"), Some("has dependencies"));
        assert_eq!(err.kind, DeleteErrorKind::InUse);
    }

    #[test]
    fn not_found_codes_map_to_not_found() {
        for code in NOT_FOUND_CODES {
            let err = classify_delete(Some(code), None);
            assert_eq!(err.kind, DeleteErrorKind::NotFound, "code: {code}");
        }
    }

    #[test]
    fn unknown_codes_are_other() {
        let err = classify_delete(Some("UnauthorizedOperation"), Some("nope"));
        assert_eq!(err.kind, DeleteErrorKind::Other);
        assert!(err.message.contains("UnauthorizedOperation"));
    }

    #[test]
    fn missing_code_is_other() {
        let err = classify_delete(None, Some("socket closed"));
        assert_eq!(err.kind, DeleteErrorKind::Other);
    }
}
