//! The `PublicationStore` trait and supporting report types.
//!
//! The trait is implemented by storage backends (e.g.
//! `folio-store-postgres`). The operator CLI and any crawl pipeline depend
//! on this abstraction, not on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  author::{Author, CrawlIntervals, NewAuthor},
  publication::{NewPublication, Publication},
  source::Source,
};

// ─── Report types ────────────────────────────────────────────────────────────

/// One input row rejected by domain validation during a crawl recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedPublication {
  pub title:  String,
  pub reason: crate::Error,
}

/// Outcome of recording one crawl result for one author.
///
/// `stored` counts rows inserted or refreshed; `rejected` lists the rows
/// that failed validation and were skipped, so an operator can see exactly
/// which inputs violated which constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
  pub author_id: i64,
  pub stored:    usize,
  pub rejected:  Vec<RejectedPublication>,
}

/// Monitoring projection: one author's crawl recency and publication count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorStatus {
  pub author_id:         i64,
  pub name:              String,
  pub source:            Source,
  pub last_crawl:        Option<DateTime<Utc>>,
  pub publication_count: i64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a folio publication store backend.
///
/// Writers (crawler workers) and readers (monitors) may run concurrently;
/// uniqueness constraints and atomic upserts are the sole coordination
/// mechanism, so no method here ever requires external locking.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait PublicationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Authors ───────────────────────────────────────────────────────────

  /// Register a new author. Fails if (name, source) is already taken.
  fn add_author(
    &self,
    input: NewAuthor,
  ) -> impl Future<Output = Result<Author, Self::Error>> + Send + '_;

  /// Retrieve an author by id. Returns `None` if not found.
  fn get_author(
    &self,
    author_id: i64,
  ) -> impl Future<Output = Result<Option<Author>, Self::Error>> + Send + '_;

  /// List all registered authors.
  fn list_authors(
    &self,
  ) -> impl Future<Output = Result<Vec<Author>, Self::Error>> + Send + '_;

  /// Authors whose last crawl is missing or older than the per-source
  /// cadence — the feed the crawl scheduler drains.
  fn authors_due_for_crawl(
    &self,
    now: DateTime<Utc>,
    intervals: CrawlIntervals,
  ) -> impl Future<Output = Result<Vec<Author>, Self::Error>> + Send + '_;

  /// Delete an author and, by cascade, all of its publications.
  fn delete_author(
    &self,
    author_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Publications ──────────────────────────────────────────────────────

  /// Insert a publication, or refresh the existing row sharing the same
  /// (author_id, title) key. Refreshing updates `year`, `source`, and
  /// `updated_at` in one atomic statement; a repeated observation is the
  /// steady-state case, never an error.
  fn record_publication(
    &self,
    author_id: i64,
    input: NewPublication,
  ) -> impl Future<Output = Result<Publication, Self::Error>> + Send + '_;

  /// Record one complete crawl result: upsert every valid publication and
  /// advance `last_crawl`, as a single atomic unit. Either all of it
  /// commits or none of it does, so a crash mid-batch cannot leave
  /// `last_crawl` advanced with publications missing.
  ///
  /// Rows failing domain validation are rejected before the transaction and
  /// reported in the returned [`CrawlReport`]; the rest still commit.
  fn record_crawl(
    &self,
    author_id: i64,
    publications: Vec<NewPublication>,
    crawled_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<CrawlReport, Self::Error>> + Send + '_;

  /// Mark an author as successfully crawled at `at`.
  fn touch_last_crawl(
    &self,
    author_id: i64,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All stored publications for one author.
  fn publications_for(
    &self,
    author_id: i64,
  ) -> impl Future<Output = Result<Vec<Publication>, Self::Error>> + Send + '_;

  // ── Monitoring ────────────────────────────────────────────────────────

  /// Crawl-progress projection over all authors.
  fn author_status(
    &self,
  ) -> impl Future<Output = Result<Vec<AuthorStatus>, Self::Error>> + Send + '_;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Delete every publication whose `updated_at` is older than
  /// `now - max_age`. Never touches author rows. Idempotent: a second run
  /// with no intervening writes deletes nothing. Returns rows deleted.
  ///
  /// Storage reclamation is deliberately not part of this trait: it needs
  /// object-owner privileges, which the runtime identity behind a store
  /// must not hold. Backends expose it on their provisioning surface
  /// instead.
  fn purge_stale_publications(
    &self,
    max_age: Duration,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
