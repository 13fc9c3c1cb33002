//! Error types for `folio-core`.
//!
//! These are the *semantic* failures of the store contract. Transport-level
//! failures (connection loss, timeouts) belong to the backend crate and are
//! kept distinct so callers can apply their own retry policy.

use std::fmt;

use serde::{Deserialize, Serialize};

// `Display`/`Error` are implemented by hand rather than via `thiserror`:
// the derive treats any field named `source` as the error's cause, and the
// `DuplicateAuthor.source` field (a scrape-source name, mandated by the
// spec) is a plain `String`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Error {
  /// An author with the same (name, source) pair is already registered.
  DuplicateAuthor { name: String, source: String },

  /// A publication year failed the `year >= 0` domain check. Indicates
  /// malformed scraped data upstream, not a store fault.
  InvalidYear(i32),

  /// A publication write referenced an author id that does not exist.
  DanglingAuthor(i64),

  AuthorNotFound(i64),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::DuplicateAuthor { name, source } => {
        write!(f, "author {name:?} is already registered for source {source:?}")
      }
      Error::InvalidYear(year) => write!(f, "publication year {year} is negative"),
      Error::DanglingAuthor(id) => {
        write!(f, "publication references nonexistent author {id}")
      }
      Error::AuthorNotFound(id) => write!(f, "author not found: {id}"),
    }
  }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;
