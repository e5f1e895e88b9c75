//! Error types for `crosspost-core`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Misdeployment: missing or malformed settings. Always fatal.
  #[error("configuration error: {0}")]
  Config(String),

  #[error("an account with uid {uid:?} already exists for {domain:?}")]
  DuplicateAccount { uid: String, domain: String },

  #[error("malformed post identifier: {0:?}")]
  InvalidPostIds(String),

  #[error("sync of {path:?} failed: {reason}")]
  Sync { path: PathBuf, reason: String },

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error surfaced through a generic operation.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
