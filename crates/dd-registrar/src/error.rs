use thiserror::Error;

/// Stable machine codes carried in `Envelope::error_code`.
pub mod codes {
    pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";
    pub const VENDOR_REJECTION: &str = "VENDOR_REJECTION";
    pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";
    pub const PARTIAL_FAILURE: &str = "PARTIAL_FAILURE";
}

/// Failure raised inside a registrar client. Never crosses the contract
/// boundary: `Envelope::from_result` turns it into `success = false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    /// Network error, timeout, or a non-2xx reply with no readable vendor body.
    #[error("Transport failure: {0}")]
    Transport(String),
    /// A well-formed error response from the provider.
    #[error("{message}")]
    Vendor {
        code: Option<String>,
        message: String,
        details: Vec<String>,
    },
    #[error("Not supported: {0}")]
    Unsupported(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Some items of a multi-item operation failed; one entry per item.
    #[error("{} item(s) failed", .0.len())]
    Partial(Vec<String>),
}

impl RegistrarError {
    pub fn vendor(code: Option<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Vendor {
            code: code.filter(|c| !c.trim().is_empty()),
            message: if message.trim().is_empty() {
                "Registrar rejected the request".to_string()
            } else {
                message
            },
            details: Vec::new(),
        }
    }

    pub fn vendor_with_details(
        code: Option<String>,
        message: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        match Self::vendor(code, message) {
            Self::Vendor { code, message, .. } => Self::Vendor { code, message, details },
            other => other,
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::Transport(_) => codes::TRANSPORT_FAILURE.to_string(),
            Self::Vendor { code: Some(code), .. } => code.clone(),
            Self::Vendor { .. } => codes::VENDOR_REJECTION.to_string(),
            Self::Unsupported(_) => codes::UNSUPPORTED_OPERATION.to_string(),
            Self::InvalidRequest(_) => codes::INVALID_REQUEST.to_string(),
            Self::MalformedResponse(_) => codes::MALFORMED_RESPONSE.to_string(),
            Self::Partial(_) => codes::PARTIAL_FAILURE.to_string(),
        }
    }

    /// Individual error lines. Never empty.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Partial(items) if !items.is_empty() => items.clone(),
            Self::Vendor { message, details, .. } if !details.is_empty() => {
                let mut lines = vec![message.clone()];
                lines.extend(details.iter().filter(|d| *d != message).cloned());
                lines
            }
            other => vec![other.to_string()],
        }
    }

    /// Whether a read may simply be repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RegistrarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
