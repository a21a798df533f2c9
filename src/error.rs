use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrmError>;

/// Errors raised by the CRM data layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CrmError {
    /// No authenticated session when a write needs one.
    #[error("not authenticated: {0}")]
    Auth(String),

    /// The backend answered with a non-success status.
    #[error("backend error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Client-side check failed before any request was sent.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl CrmError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Text suitable for a toast or inline error panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => "You must be signed in to make changes.".to_string(),
            Self::Remote { message, .. } if !message.is_empty() => message.clone(),
            Self::Remote { status, .. } => format!("The server rejected the request ({status})."),
            Self::Network(_) => {
                "Could not reach the server. Please check your connection.".to_string()
            }
            Self::Decode(_) => "The server returned an unexpected response.".to_string(),
            Self::Validation { field, message } => format!("{field}: {message}"),
            Self::NotFound { entity, .. } => format!("That {entity} no longer exists."),
            Self::Config(msg) => msg.clone(),
        }
    }

    /// Whether a read that failed this way is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Remote {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CrmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_message_is_shown_verbatim() {
        let err = CrmError::Remote {
            status: 409,
            message: "duplicate key value".to_string(),
        };
        assert_eq!(err.user_message(), "duplicate key value");
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = CrmError::Remote {
            status: 503,
            message: String::new(),
        };
        assert!(err.is_retryable());
        assert!(CrmError::Network("timeout".into()).is_retryable());
        assert!(!CrmError::Auth("no session".into()).is_retryable());
    }
}
