//! Publication records and their domain validation.
//!
//! A publication row is keyed by (author_id, title). Observing the same
//! title again is a refresh of the existing row, never a second row — the
//! backend enforces this with an atomic upsert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, source::Source};

/// A stored publication attributed to one author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
  pub publication_id: i64,
  pub author_id:      i64,
  pub title:          String,
  pub year:           Option<i32>,
  /// Advanced on every successful refresh; drives the retention purge.
  pub updated_at:     DateTime<Utc>,
  pub source:         Source,
}

/// A publication as observed by the crawl pipeline, before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPublication {
  pub title:  String,
  pub year:   Option<i32>,
  pub source: Source,
}

impl NewPublication {
  pub fn new(
    title: impl Into<String>,
    year: Option<i32>,
    source: Source,
  ) -> Self {
    Self { title: title.into(), year, source }
  }

  /// Domain check applied before any write reaches the database. A negative
  /// year signals malformed scraped data; the record is rejected and the
  /// rest of the batch continues.
  pub fn validate(&self) -> Result<()> {
    if let Some(y) = self.year
      && y < 0
    {
      return Err(Error::InvalidYear(y));
    }
    Ok(())
  }
}
