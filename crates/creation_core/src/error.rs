//! crates/creation_core/src/error.rs
//!
//! The failure taxonomy of a generation request. Every variant is translated
//! into a non-throwing response at the pipeline boundary.

use crate::ports::PortError;

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Limit reached. Upgrade to continue.";
pub const PLAN_RESTRICTED_MESSAGE: &str = "This feature is only available for premium users.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Unauthorized: user not logged in")]
    Unauthorized,

    #[error("{}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceeded,

    #[error("{}", PLAN_RESTRICTED_MESSAGE)]
    PlanRestricted,

    #[error("{0}")]
    Validation(String),

    /// An uploaded payload above the capability's size ceiling.
    #[error("{} file size exceeds allowed size ({})", .label, display_size(.limit))]
    PayloadTooLarge {
        label: &'static str,
        limit: u64,
        actual: u64,
    },

    #[error("{0}")]
    Provider(String),

    #[error("Failed to save creation: {0}")]
    Persistence(String),

    #[error("Entitlement store error: {0}")]
    EntitlementStore(String),
}

const MIB: u64 = 1024 * 1024;

/// Renders a byte ceiling the way users read it: whole or fractional megabytes,
/// falling back to kilobytes or bytes for small limits.
fn display_size(bytes: &u64) -> String {
    let bytes = *bytes;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

impl GenerationError {
    /// Business denials are expected outcomes rather than faults.
    pub fn is_business_denial(&self) -> bool {
        matches!(
            self,
            GenerationError::QuotaExceeded
                | GenerationError::PlanRestricted
                | GenerationError::PayloadTooLarge { .. }
        )
    }

    /// Maps a provider port failure, keeping only its message.
    pub fn provider(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) | PortError::Unexpected(msg) => GenerationError::Provider(msg),
            PortError::InvalidInput(msg) => GenerationError::Validation(msg),
            PortError::Unauthorized => {
                GenerationError::Provider("Provider rejected the credentials".to_string())
            }
        }
    }

    pub fn entitlement(err: PortError) -> Self {
        match err {
            PortError::Unauthorized | PortError::NotFound(_) => GenerationError::Unauthorized,
            PortError::Unexpected(msg) | PortError::InvalidInput(msg) => {
                GenerationError::EntitlementStore(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn too_large(limit: u64) -> String {
        GenerationError::PayloadTooLarge {
            label: "Resume",
            limit,
            actual: limit + 1,
        }
        .to_string()
    }

    #[test]
    fn size_limit_message_does_not_truncate() {
        assert_eq!(too_large(5 * MIB), "Resume file size exceeds allowed size (5MB)");
        assert_eq!(too_large(5 * MIB + MIB / 2), "Resume file size exceeds allowed size (5.5MB)");
        assert_eq!(too_large(512 * 1024), "Resume file size exceeds allowed size (512KB)");
        assert_eq!(too_large(16), "Resume file size exceeds allowed size (16 bytes)");
    }

    #[test]
    fn rejected_input_maps_to_validation() {
        assert_eq!(
            GenerationError::provider(PortError::InvalidInput("not a pdf".to_string())),
            GenerationError::Validation("not a pdf".to_string())
        );
        assert_eq!(
            GenerationError::provider(PortError::Unexpected("503".to_string())),
            GenerationError::Provider("503".to_string())
        );
    }
}
