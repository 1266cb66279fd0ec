use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Element is detached from the page: {0}")]
    ElementDetached(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Navigation did not reach the expected stage: {0}")]
    NavigationTimeout(String),

    #[error("Host runtime disconnected: {0}")]
    RuntimeDisconnected(String),

    #[error("Stage '{stage}' failed ({code}): {reason}")]
    StageFailed {
        stage: String,
        code: String,
        reason: String,
    },

    #[error("Host request failed: {0}")]
    Host(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Stable reason code attached to log events so failures can be
    /// aggregated without parsing messages.
    pub fn reason_code(&self) -> &str {
        match self {
            AutomationError::ElementNotFound(_) => "not_found",
            AutomationError::ElementNotEnabled(_) => "disabled",
            AutomationError::ElementDetached(_) => "detached",
            AutomationError::Timeout(_) => "timeout",
            AutomationError::NavigationTimeout(_) => "navigation_timeout",
            AutomationError::RuntimeDisconnected(_) => "runtime_disconnected",
            AutomationError::StageFailed { code, .. } => code,
            AutomationError::Host(_) => "host_error",
            AutomationError::InvalidArgument(_) => "invalid_argument",
            AutomationError::UnsupportedOperation(_) => "unsupported",
            AutomationError::PlatformError(_) => "platform_error",
            AutomationError::Internal(_) => "internal",
        }
    }

    /// Whether the host context is gone and retrying cannot succeed.
    pub fn is_runtime_disconnected(&self) -> bool {
        match self {
            AutomationError::RuntimeDisconnected(_) => true,
            AutomationError::StageFailed { code, .. } => code == "runtime_disconnected",
            AutomationError::Host(message) => crate::host::is_runtime_disconnected(message),
            _ => false,
        }
    }
}
