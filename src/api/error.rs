use thiserror::Error;

/// Failure of a request against the remote store.
///
/// Every variant routes a mutation attempt to rollback; the variants only
/// matter to the transport's retry rule and to what the user is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  #[error("request timed out")]
  Timeout,

  #[error("connection failed: {0}")]
  Connect(String),

  #[error("unauthorized (401)")]
  Unauthorized,

  #[error("server returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error("request failed: {0}")]
  Request(String),
}

impl ApiError {
  /// Whether the transport may silently retry an idempotent request.
  pub fn is_retryable(&self) -> bool {
    match self {
      ApiError::Timeout | ApiError::Connect(_) => true,
      ApiError::Status { status, .. } => *status >= 500,
      _ => false,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ApiError::Timeout
    } else if e.is_connect() {
      ApiError::Connect(e.to_string())
    } else if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else {
      ApiError::Request(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Decode(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_errors() {
    assert!(ApiError::Timeout.is_retryable());
    assert!(ApiError::Connect("refused".into()).is_retryable());
    assert!(ApiError::Status {
      status: 503,
      body: String::new()
    }
    .is_retryable());
  }

  #[test]
  fn test_client_errors_are_not_retried() {
    assert!(!ApiError::Unauthorized.is_retryable());
    assert!(!ApiError::Status {
      status: 404,
      body: String::new()
    }
    .is_retryable());
    assert!(!ApiError::Decode("eof".into()).is_retryable());
  }
}
