//! [`PgStore`] — the Postgres implementation of [`PublicationStore`].
//!
//! Connects as the restricted runtime identity. Concurrent crawler workers
//! coordinate solely through the schema's uniqueness constraints and the
//! atomic `ON CONFLICT` upsert; a race on the same (author_id, title) key
//! resolves to the last committed write, never a duplicate row and never a
//! constraint violation surfaced to the caller.

use chrono::{DateTime, Duration, Utc};
use sqlx::{
  Row as _,
  error::ErrorKind,
  postgres::{PgPool, PgPoolOptions, PgRow},
};

use folio_core::{
  author::{Author, CrawlIntervals, NewAuthor},
  publication::{NewPublication, Publication},
  source::Source,
  store::{AuthorStatus, CrawlReport, PublicationStore, RejectedPublication},
};

use crate::{Error, Result, config::StoreConfig};

// ─── SQL ─────────────────────────────────────────────────────────────────────

const AUTHOR_COLUMNS: &str = "author_id, name, source, profile_url, last_crawl";

/// The insert-or-refresh contract of the write path. A repeated observation
/// of the same title across crawl cycles lands on the `DO UPDATE` arm,
/// refreshing `year`, `source`, and `updated_at` in the same statement the
/// insert would have run — check-then-act would race under concurrent
/// writers.
const UPSERT_PUBLICATION: &str = "
  INSERT INTO publications (author_id, title, year, source)
  VALUES ($1, $2, $3, $4)
  ON CONFLICT (author_id, title) DO UPDATE
  SET year       = EXCLUDED.year,
      source     = EXCLUDED.source,
      updated_at = now()
  RETURNING publication_id, author_id, title, year, updated_at, source";

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn author_from_row(row: &PgRow) -> Result<Author> {
  Ok(Author {
    author_id:   row.try_get("author_id")?,
    name:        row.try_get("name")?,
    source:      Source::from(row.try_get::<String, _>("source")?),
    profile_url: row.try_get("profile_url")?,
    last_crawl:  row.try_get("last_crawl")?,
  })
}

fn publication_from_row(row: &PgRow) -> Result<Publication> {
  Ok(Publication {
    publication_id: row.try_get("publication_id")?,
    author_id:      row.try_get("author_id")?,
    title:          row.try_get("title")?,
    year:           row.try_get("year")?,
    updated_at:     row.try_get("updated_at")?,
    source:         Source::from(row.try_get::<String, _>("source")?),
  })
}

/// Map a publication-write failure onto the domain taxonomy. A foreign-key
/// violation means the referenced author does not exist.
fn map_publication_error(e: sqlx::Error, author_id: i64) -> Error {
  match e.as_database_error().map(|d| d.kind()) {
    Some(ErrorKind::ForeignKeyViolation) => {
      folio_core::Error::DanglingAuthor(author_id).into()
    }
    _ => e.into(),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A folio publication store backed by a pooled Postgres connection.
///
/// Cloning is cheap — the inner pool is reference-counted. Connections are
/// acquired per logical operation and released on every exit path,
/// including failure.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  /// Connect as the runtime identity named in `config`.
  ///
  /// Assumes [`crate::bootstrap`] has already installed the schema; this
  /// path deliberately holds no DDL privileges.
  pub async fn connect(config: &StoreConfig) -> Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(config.max_connections)
      .acquire_timeout(config.acquire_timeout())
      .connect_with(config.runtime_options())
      .await?;
    Ok(Self { pool })
  }

  /// Wrap an existing pool — used by tests and embedders that manage their
  /// own connection lifecycle.
  pub fn from_pool(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

// ─── PublicationStore impl ───────────────────────────────────────────────────

impl PublicationStore for PgStore {
  type Error = Error;

  // ── Authors ───────────────────────────────────────────────────────────────

  async fn add_author(&self, input: NewAuthor) -> Result<Author> {
    let row = sqlx::query(&format!(
      "INSERT INTO authors (name, source, profile_url)
       VALUES ($1, $2, $3)
       RETURNING {AUTHOR_COLUMNS}"
    ))
    .bind(&input.name)
    .bind(input.source.as_str())
    .bind(&input.profile_url)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| match e.as_database_error().map(|d| d.kind()) {
      Some(ErrorKind::UniqueViolation) => {
        Error::from(folio_core::Error::DuplicateAuthor {
          name:   input.name.clone(),
          source: input.source.to_string(),
        })
      }
      _ => e.into(),
    })?;

    author_from_row(&row)
  }

  async fn get_author(&self, author_id: i64) -> Result<Option<Author>> {
    let row = sqlx::query(&format!(
      "SELECT {AUTHOR_COLUMNS} FROM authors WHERE author_id = $1"
    ))
    .bind(author_id)
    .fetch_optional(&self.pool)
    .await?;

    row.as_ref().map(author_from_row).transpose()
  }

  async fn list_authors(&self) -> Result<Vec<Author>> {
    let rows = sqlx::query(&format!(
      "SELECT {AUTHOR_COLUMNS} FROM authors ORDER BY author_id"
    ))
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(author_from_row).collect()
  }

  async fn authors_due_for_crawl(
    &self,
    now: DateTime<Utc>,
    intervals: CrawlIntervals,
  ) -> Result<Vec<Author>> {
    // Cutoffs are computed here so the query binds plain timestamps; dblp
    // has its own cadence, every other source follows the google one.
    let dblp_cutoff   = now - intervals.dblp;
    let google_cutoff = now - intervals.google;

    let rows = sqlx::query(&format!(
      "SELECT {AUTHOR_COLUMNS}
       FROM authors
       WHERE last_crawl IS NULL
          OR (source =  'dblp' AND last_crawl <= $1)
          OR (source <> 'dblp' AND last_crawl <= $2)
       ORDER BY last_crawl ASC NULLS FIRST"
    ))
    .bind(dblp_cutoff)
    .bind(google_cutoff)
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(author_from_row).collect()
  }

  async fn delete_author(&self, author_id: i64) -> Result<()> {
    // Publications go with the author via ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM authors WHERE author_id = $1")
      .bind(author_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(folio_core::Error::AuthorNotFound(author_id).into());
    }
    tracing::info!(author_id, "deleted author and cascaded publications");
    Ok(())
  }

  // ── Publications ──────────────────────────────────────────────────────────

  async fn record_publication(
    &self,
    author_id: i64,
    input: NewPublication,
  ) -> Result<Publication> {
    input.validate()?;

    let row = sqlx::query(UPSERT_PUBLICATION)
      .bind(author_id)
      .bind(&input.title)
      .bind(input.year)
      .bind(input.source.as_str())
      .fetch_one(&self.pool)
      .await
      .map_err(|e| map_publication_error(e, author_id))?;

    publication_from_row(&row)
  }

  async fn record_crawl(
    &self,
    author_id: i64,
    publications: Vec<NewPublication>,
    crawled_at: DateTime<Utc>,
  ) -> Result<CrawlReport> {
    // Malformed rows are rejected up front and reported per-row; the valid
    // remainder still commits.
    let mut valid    = Vec::with_capacity(publications.len());
    let mut rejected = Vec::new();
    for p in publications {
      match p.validate() {
        Ok(()) => valid.push(p),
        Err(reason) => {
          tracing::warn!(title = %p.title, %reason, "rejecting publication");
          rejected.push(RejectedPublication { title: p.title, reason });
        }
      }
    }

    // One transaction for the whole crawl result: last_crawl never advances
    // without every stored publication, and an aborted attempt leaves no
    // trace (the transaction rolls back on drop).
    let mut tx = self.pool.begin().await?;

    let touched =
      sqlx::query("UPDATE authors SET last_crawl = $2 WHERE author_id = $1")
        .bind(author_id)
        .bind(crawled_at)
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
      return Err(folio_core::Error::AuthorNotFound(author_id).into());
    }

    for p in &valid {
      sqlx::query(UPSERT_PUBLICATION)
        .bind(author_id)
        .bind(&p.title)
        .bind(p.year)
        .bind(p.source.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_publication_error(e, author_id))?;
    }

    tx.commit().await?;

    tracing::debug!(
      author_id,
      stored = valid.len(),
      rejected = rejected.len(),
      "recorded crawl result"
    );
    Ok(CrawlReport { author_id, stored: valid.len(), rejected })
  }

  async fn touch_last_crawl(
    &self,
    author_id: i64,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let result =
      sqlx::query("UPDATE authors SET last_crawl = $2 WHERE author_id = $1")
        .bind(author_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

    if result.rows_affected() == 0 {
      return Err(folio_core::Error::AuthorNotFound(author_id).into());
    }
    Ok(())
  }

  async fn publications_for(&self, author_id: i64) -> Result<Vec<Publication>> {
    let rows = sqlx::query(
      "SELECT publication_id, author_id, title, year, updated_at, source
       FROM publications
       WHERE author_id = $1
       ORDER BY publication_id",
    )
    .bind(author_id)
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(publication_from_row).collect()
  }

  // ── Monitoring ────────────────────────────────────────────────────────────

  async fn author_status(&self) -> Result<Vec<AuthorStatus>> {
    let rows = sqlx::query(
      "SELECT a.author_id, a.name, a.source, a.last_crawl,
              COUNT(p.publication_id) AS publication_count
       FROM authors a
       LEFT JOIN publications p ON p.author_id = a.author_id
       GROUP BY a.author_id, a.name, a.source, a.last_crawl
       ORDER BY a.name, a.source",
    )
    .fetch_all(&self.pool)
    .await?;

    rows
      .iter()
      .map(|row| {
        Ok(AuthorStatus {
          author_id:         row.try_get("author_id")?,
          name:              row.try_get("name")?,
          source:            Source::from(row.try_get::<String, _>("source")?),
          last_crawl:        row.try_get("last_crawl")?,
          publication_count: row.try_get("publication_count")?,
        })
      })
      .collect()
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn purge_stale_publications(&self, max_age: Duration) -> Result<u64> {
    // The cutoff is computed against the server clock, the same clock that
    // stamps `updated_at`, so skew on the calling host cannot widen or
    // narrow the retention window.
    let max_age_micros = max_age.num_microseconds().unwrap_or(i64::MAX);

    let result = sqlx::query(
      "DELETE FROM publications
       WHERE updated_at < now() - $1 * interval '1 microsecond'",
    )
    .bind(max_age_micros)
    .execute(&self.pool)
    .await?;

    let purged = result.rows_affected();
    tracing::info!(purged, "purged stale publications");
    Ok(purged)
  }
}
