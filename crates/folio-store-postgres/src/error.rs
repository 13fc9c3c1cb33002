//! Error type for `folio-store-postgres`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A semantic failure of the store contract (duplicate key, invalid
  /// value, dangling reference, not found). Recoverable per record.
  #[error("core error: {0}")]
  Core(#[from] folio_core::Error),

  /// A transport-level failure (connection refused, pool timeout, …).
  /// Left to the caller's retry policy; the store performs no hidden
  /// retries.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// The runtime identity holds privileges it must not have, or lacks ones
  /// it needs. Raised only by [`crate::bootstrap::verify_runtime`].
  #[error("privilege verification failed: {0}")]
  Verification(String),
}

impl Error {
  /// The semantic error, if this is one. `None` for transport and
  /// verification failures.
  pub fn as_core(&self) -> Option<&folio_core::Error> {
    match self {
      Error::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
