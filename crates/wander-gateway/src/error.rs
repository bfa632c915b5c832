use thiserror::Error;

use crate::directory::DirectoryError;

/// Failures of the messaging and notification core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required field is missing or empty. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// The caller is not allowed to see or act on the resource.
    #[error("access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(String),

    /// Any open transaction has already been rolled back.
    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Text that is safe to show to a client. Storage details stay server-side.
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DirectoryError> for ChatError {
    fn from(err: DirectoryError) -> Self {
        Self::Storage(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_details_are_hidden() {
        let err = ChatError::Storage(anyhow::anyhow!("disk I/O error at /var/lib/wander.db"));
        assert_eq!(err.client_message(), "internal server error");
    }

    #[test]
    fn other_errors_are_shown_verbatim() {
        assert_eq!(ChatError::AccessDenied.client_message(), "access denied");
        assert_eq!(
            ChatError::NotFound("conversation 4".into()).client_message(),
            "conversation 4 not found"
        );
        assert_eq!(
            ChatError::validation("content is required").client_message(),
            "content is required"
        );
    }
}
