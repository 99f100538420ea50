use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("deadline")]
    Deadline,

    #[error("Could not parse model output: {message}")]
    ProviderFormat {
        message: String,
        position: Option<usize>,
    },

    #[error("Invalid gateway request: {0}")]
    GatewayInvalid(String),

    #[error("Management report unavailable: {0}")]
    ReportUnavailable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The user-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    ProviderFormat,
    BadPlan,
    GatewayInvalid,
    GatewayEmpty,
    ExtractorPartial,
    ReportUnavailable,
    Internal,
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable(_) | Self::Deadline => ErrorKind::ProviderUnavailable,
            Self::ProviderFormat { .. } => ErrorKind::ProviderFormat,
            Self::GatewayInvalid(_) | Self::InvalidRecord(_) => ErrorKind::GatewayInvalid,
            Self::ReportUnavailable(_) => ErrorKind::ReportUnavailable,
            Self::ExtractionFailed(_) => ErrorKind::ProviderFormat,
            Self::DateError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// The message without the variant's display prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::ProviderUnavailable(m)
            | Self::GatewayInvalid(m)
            | Self::ReportUnavailable(m)
            | Self::InvalidRecord(m)
            | Self::ExtractionFailed(m)
            | Self::DateError(m)
            | Self::Internal(m) => m.clone(),
            Self::ProviderFormat { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::ProviderFormat {
            message: message.into(),
            position: None,
        }
    }

    /// Rebuilds an error from its kind and message, used when a failure was
    /// carried inside a plan rather than returned directly.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::ProviderUnavailable if message == "deadline" => Self::Deadline,
            ErrorKind::ProviderUnavailable => Self::ProviderUnavailable(message),
            ErrorKind::ProviderFormat | ErrorKind::BadPlan | ErrorKind::ExtractorPartial => {
                Self::format(message)
            }
            ErrorKind::GatewayInvalid | ErrorKind::GatewayEmpty => Self::GatewayInvalid(message),
            ErrorKind::ReportUnavailable => Self::ReportUnavailable(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_provider_unavailable() {
        let err = AssistantError::Deadline;
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.to_string(), "deadline");
    }

    #[test]
    fn test_from_kind_round_trips_kind() {
        for kind in [
            ErrorKind::ProviderUnavailable,
            ErrorKind::ProviderFormat,
            ErrorKind::GatewayInvalid,
            ErrorKind::ReportUnavailable,
            ErrorKind::Internal,
        ] {
            assert_eq!(AssistantError::from_kind(kind, "x").kind(), kind);
        }
        assert!(matches!(
            AssistantError::from_kind(ErrorKind::ProviderUnavailable, "deadline"),
            AssistantError::Deadline
        ));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ReportUnavailable).unwrap();
        assert_eq!(json, "\"report_unavailable\"");
    }
}
