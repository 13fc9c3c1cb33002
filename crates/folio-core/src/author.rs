//! Author — the crawl target an external pipeline harvests publications for.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Source;

/// A registered author profile on one source.
///
/// The same human may appear once per source; (name, source) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
  pub author_id:   i64,
  pub name:        String,
  pub source:      Source,
  pub profile_url: String,
  /// `None` means the author has never been successfully crawled.
  pub last_crawl:  Option<DateTime<Utc>>,
}

/// Input for registering an author. The id is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthor {
  pub name:        String,
  pub source:      Source,
  pub profile_url: String,
}

// ─── Crawl cadence ───────────────────────────────────────────────────────────

/// Per-source re-crawl cadence. Sources the pipeline has no dedicated
/// schedule for fall back to the Google Scholar interval.
#[derive(Debug, Clone, Copy)]
pub struct CrawlIntervals {
  pub google: Duration,
  pub dblp:   Duration,
}

impl Default for CrawlIntervals {
  fn default() -> Self {
    Self {
      google: Duration::days(7),
      dblp:   Duration::days(30),
    }
  }
}

impl CrawlIntervals {
  pub fn for_source(&self, source: &Source) -> Duration {
    match source {
      Source::Dblp => self.dblp,
      _ => self.google,
    }
  }
}

impl Author {
  /// Whether this author should be handed to the crawl pipeline at `now`.
  pub fn due_for_crawl(
    &self,
    now: DateTime<Utc>,
    intervals: &CrawlIntervals,
  ) -> bool {
    match self.last_crawl {
      None => true,
      Some(at) => now - at >= intervals.for_source(&self.source),
    }
  }
}
