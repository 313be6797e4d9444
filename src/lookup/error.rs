use serde::Serialize;

use crate::weather::ResolutionError;

/// Failure reading from or writing to the cache store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("could not find city '{key}' in the cache")]
  Miss { key: String },
  #[error("cache backend failed: {0}")]
  Backend(color_eyre::Report),
  #[error("cache operation cancelled")]
  Cancelled,
}

/// Everything a lookup can fail with.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
  #[error("city name must not be empty")]
  InvalidInput,
  #[error(transparent)]
  Resolution(#[from] ResolutionError),
  #[error(transparent)]
  Cache(#[from] CacheError),
  /// The cache reported the key as present but it was gone by the time it
  /// was read.
  #[error("cached weather for '{key}' expired while it was being read")]
  ExpiredHit { key: String },
}

/// Coarse classification of lookup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  UpstreamUnavailable,
  NotFound,
  InvalidCredentials,
  InvalidInput,
  CacheMiss,
  CacheUnavailable,
  Cancelled,
}

/// Who is expected to act on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
  /// The caller can correct the request (HTTP 4xx)
  Client,
  /// The service itself failed (HTTP 5xx)
  Server,
}

impl LookupError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidInput => ErrorKind::InvalidInput,
      Self::Resolution(e) => match e {
        ResolutionError::NotFound { .. } => ErrorKind::NotFound,
        ResolutionError::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
        ResolutionError::Upstream { .. } => ErrorKind::UpstreamUnavailable,
        ResolutionError::Cancelled => ErrorKind::Cancelled,
      },
      Self::Cache(e) => match e {
        CacheError::Miss { .. } => ErrorKind::CacheMiss,
        CacheError::Backend(_) => ErrorKind::CacheUnavailable,
        CacheError::Cancelled => ErrorKind::Cancelled,
      },
      Self::ExpiredHit { .. } => ErrorKind::CacheMiss,
    }
  }

  pub fn failure_class(&self) -> FailureClass {
    match self {
      Self::ExpiredHit { .. } | Self::Cache(CacheError::Backend(_)) => FailureClass::Server,
      _ => FailureClass::Client,
    }
  }

  /// HTTP status a request boundary should answer with.
  pub fn status_code(&self) -> u16 {
    if self.kind() == ErrorKind::Cancelled {
      // Client closed request
      return 499;
    }
    match self.failure_class() {
      FailureClass::Client => 400,
      FailureClass::Server => 500,
    }
  }
}

/// JSON error body for the request boundary.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub code: u16,
  pub kind: ErrorKind,
  pub message: String,
}

impl From<&LookupError> for ErrorBody {
  fn from(err: &LookupError) -> Self {
    Self {
      code: err.status_code(),
      kind: err.kind(),
      message: err.to_string(),
    }
  }
}
