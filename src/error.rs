use thiserror::Error;

/// Failures surfaced by the gateway and session.
///
/// Missing or malformed fields inside an analysis result are not errors:
/// they are replaced by defaults when the result is decoded and projected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    AuthenticationRequired,

    #[error("login rejected: {0}")]
    AuthenticationRejected(String),

    #[error("server returned {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("no analysis available: {0}")]
    NoAnalysis(String),

    #[error("token storage failed: {0}")]
    Storage(String),
}

impl ApiError {
    /// Short sentence suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::AuthenticationRequired => "Please log in first.".to_string(),
            ApiError::AuthenticationRejected(msg) => msg.clone(),
            ApiError::ServerError { message, .. } => format!("Analysis failed: {}", message),
            ApiError::NetworkFailure(_) => "Network error. Try again.".to_string(),
            ApiError::NoAnalysis(msg) => msg.clone(),
            ApiError::Storage(detail) => format!("Could not access local storage: {}", detail),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ApiError::AuthenticationRequired.user_message(),
            "Please log in first."
        );
        assert_eq!(
            ApiError::AuthenticationRejected("Email is required".into()).user_message(),
            "Email is required"
        );
        assert_eq!(
            ApiError::ServerError {
                status: 400,
                message: "Resume file missing".into()
            }
            .user_message(),
            "Analysis failed: Resume file missing"
        );
        assert_eq!(
            ApiError::NetworkFailure("connection refused".into()).user_message(),
            "Network error. Try again."
        );
        assert_eq!(
            ApiError::NoAnalysis("No analyses yet".into()).user_message(),
            "No analyses yet"
        );
    }

    #[test]
    fn test_storage_error_from_rusqlite() {
        let err: ApiError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, ApiError::Storage(_)));
    }
}
