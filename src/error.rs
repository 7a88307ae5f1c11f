//! Error kinds returned across the per-source fetch boundary.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No author found for '{0}'")]
    AuthorNotFound(String),
    #[error("retry budget exceeded after {attempts} attempts: {last_error}")]
    RetryBudgetExceeded { attempts: u32, last_error: String },
    #[error("timed out waiting for '{label}' after {attempts} attempts: {last_error}")]
    Timeout {
        label: String,
        attempts: u32,
        last_error: String,
    },
    #[error("{0}")]
    Unexpected(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::AuthorNotFound(_) => "author_not_found",
            FetchError::RetryBudgetExceeded { .. } => "retry_budget_exceeded",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        FetchError::Unexpected(format!("{:#}", err))
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Unexpected(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn author_not_found_cites_name() {
        let err = FetchError::AuthorNotFound("Ada Lovelace".into());
        assert_eq!(err.to_string(), "No author found for 'Ada Lovelace'");
        assert_eq!(err.kind(), "author_not_found");
    }

    #[test]
    fn timeout_reports_last_lookup_error() {
        let err = FetchError::Timeout {
            label: "Verified peer reviews".into(),
            attempts: 10,
            last_error: "webdriver error 404: invalid session id".into(),
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for 'Verified peer reviews' after 10 attempts: \
             webdriver error 404: invalid session id"
        );
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn anyhow_keeps_context_chain() {
        let err: FetchError = anyhow!("connection reset").context("failed to reach Scholar").into();
        match err {
            FetchError::Unexpected(msg) => {
                assert_eq!(msg, "failed to reach Scholar: connection reset")
            }
            other => panic!("wrong error: {other:?}"),
        }
    }
}
