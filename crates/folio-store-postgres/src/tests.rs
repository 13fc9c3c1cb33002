//! Integration tests for `PgStore` against a live Postgres instance.
//!
//! Set `FOLIO_TEST_DATABASE_URL` (a connection string with role-creation
//! rights) to run these; when it is unset every test returns early so the
//! suite stays green on machines without Postgres. Each test installs the
//! DDL into its own throwaway Postgres schema, pinned via `search_path`, and
//! drops it on completion.

use std::str::FromStr as _;

use chrono::{Duration, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use folio_core::{
  author::{Author, CrawlIntervals, NewAuthor},
  publication::NewPublication,
  source::Source,
  store::PublicationStore,
};

use crate::{Error, PgStore, schema::SCHEMA};

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
  store:  PgStore,
  schema: String,
}

impl Harness {
  /// `None` when `FOLIO_TEST_DATABASE_URL` is unset.
  async fn connect(test: &str) -> Option<Harness> {
    let url = std::env::var("FOLIO_TEST_DATABASE_URL").ok()?;
    let schema = format!("folio_test_{test}_{}", std::process::id());

    let options = PgConnectOptions::from_str(&url)
      .expect("FOLIO_TEST_DATABASE_URL must be a valid postgres URL")
      .options([("search_path", schema.as_str())]);

    let pool = PgPoolOptions::new()
      .max_connections(4)
      .connect_with(options)
      .await
      .expect("connect to test database");

    // Schema-qualified DROP/CREATE works even though search_path points at
    // a schema that does not exist yet; the unqualified DDL then lands in
    // the fresh namespace.
    let reset = format!(
      "DROP SCHEMA IF EXISTS \"{schema}\" CASCADE; CREATE SCHEMA \"{schema}\";"
    );
    sqlx::raw_sql(&reset)
      .execute(&pool)
      .await
      .expect("create test schema");
    sqlx::raw_sql(SCHEMA)
      .execute(&pool)
      .await
      .expect("install schema");

    Some(Harness { store: PgStore::from_pool(pool), schema })
  }

  async fn teardown(self) {
    let sql = format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema);
    let _ = sqlx::raw_sql(&sql).execute(self.store.pool()).await;
  }
}

fn ada() -> NewAuthor {
  NewAuthor {
    name:        "Ada Lovelace".into(),
    source:      Source::Google,
    profile_url: "http://x".into(),
  }
}

fn dblp_author(name: &str) -> NewAuthor {
  NewAuthor {
    name:        name.into(),
    source:      Source::Dblp,
    profile_url: format!("https://dblp.example/{name}"),
  }
}

fn publication(title: &str, year: Option<i32>) -> NewPublication {
  NewPublication::new(title, year, Source::Google)
}

fn core_err(e: &Error) -> &folio_core::Error {
  e.as_core().expect("expected a semantic store error")
}

/// Postgres keeps microseconds, `Utc::now()` nanoseconds; compare with a
/// millisecond of slack instead of exact equality.
fn close(a: chrono::DateTime<Utc>, b: chrono::DateTime<Utc>) -> bool {
  (a - b).num_milliseconds().abs() <= 1
}

// ─── Authors ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_author_yields_exactly_one_row() {
  let Some(h) = Harness::connect("dup_author").await else { return };

  h.store.add_author(ada()).await.unwrap();
  let err = h.store.add_author(ada()).await.unwrap_err();
  assert!(matches!(
    core_err(&err),
    folio_core::Error::DuplicateAuthor { name, source }
      if name == "Ada Lovelace" && source == "google"
  ));

  let all = h.store.list_authors().await.unwrap();
  assert_eq!(all.len(), 1);

  // Same name under a different source is a different author.
  let mut other = ada();
  other.source = Source::Dblp;
  h.store.add_author(other).await.unwrap();
  assert_eq!(h.store.list_authors().await.unwrap().len(), 2);

  h.teardown().await;
}

#[tokio::test]
async fn get_author_missing_returns_none() {
  let Some(h) = Harness::connect("get_missing").await else { return };

  assert!(h.store.get_author(99_999).await.unwrap().is_none());

  h.teardown().await;
}

#[tokio::test]
async fn new_author_has_no_last_crawl() {
  let Some(h) = Harness::connect("fresh_author").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  assert!(author.last_crawl.is_none());

  let fetched = h.store.get_author(author.author_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Ada Lovelace");
  assert!(fetched.last_crawl.is_none());

  h.teardown().await;
}

// ─── Publication upsert ──────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_title_refreshes_the_single_row() {
  let Some(h) = Harness::connect("upsert").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();

  let first = h
    .store
    .record_publication(author.author_id, publication("On Computation", Some(1843)))
    .await
    .unwrap();
  let second = h
    .store
    .record_publication(author.author_id, publication("On Computation", Some(1843)))
    .await
    .unwrap();
  assert_eq!(second.publication_id, first.publication_id);
  assert_eq!(second.year, Some(1843));
  assert_eq!(
    h.store.publications_for(author.author_id).await.unwrap().len(),
    1
  );

  // A corrected year lands on the same row with an advanced updated_at.
  tokio::time::sleep(std::time::Duration::from_millis(10)).await;
  let third = h
    .store
    .record_publication(author.author_id, publication("On Computation", Some(1844)))
    .await
    .unwrap();
  assert_eq!(third.publication_id, first.publication_id);
  assert_eq!(third.year, Some(1844));
  assert!(third.updated_at > first.updated_at);
  assert_eq!(
    h.store.publications_for(author.author_id).await.unwrap().len(),
    1
  );

  h.teardown().await;
}

#[tokio::test]
async fn dangling_author_reference_is_rejected() {
  let Some(h) = Harness::connect("dangling").await else { return };

  let err = h
    .store
    .record_publication(99_999, publication("Ghost Paper", Some(2020)))
    .await
    .unwrap_err();
  assert!(matches!(
    core_err(&err),
    folio_core::Error::DanglingAuthor(99_999)
  ));

  h.teardown().await;
}

#[tokio::test]
async fn year_domain_check() {
  let Some(h) = Harness::connect("year_check").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();

  let err = h
    .store
    .record_publication(author.author_id, publication("Bad Year", Some(-1)))
    .await
    .unwrap_err();
  assert!(matches!(core_err(&err), folio_core::Error::InvalidYear(-1)));
  assert!(h.store.publications_for(author.author_id).await.unwrap().is_empty());

  for (title, year) in [("Year Zero", Some(0)), ("Recent", Some(2024)), ("Undated", None)] {
    let stored = h
      .store
      .record_publication(author.author_id, publication(title, year))
      .await
      .unwrap();
    assert_eq!(stored.year, year);
  }

  h.teardown().await;
}

// ─── Cascade delete ──────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_an_author_cascades_to_its_publications_only() {
  let Some(h) = Harness::connect("cascade").await else { return };

  let a1 = h.store.add_author(ada()).await.unwrap();
  let a2 = h.store.add_author(dblp_author("Charles Babbage")).await.unwrap();

  for title in ["P1", "P2"] {
    h.store
      .record_publication(a1.author_id, publication(title, Some(1843)))
      .await
      .unwrap();
  }
  h.store
    .record_publication(a2.author_id, publication("Engine Notes", Some(1837)))
    .await
    .unwrap();

  h.store.delete_author(a1.author_id).await.unwrap();

  assert!(h.store.get_author(a1.author_id).await.unwrap().is_none());
  assert!(h.store.publications_for(a1.author_id).await.unwrap().is_empty());
  assert_eq!(h.store.publications_for(a2.author_id).await.unwrap().len(), 1);

  let err = h.store.delete_author(a1.author_id).await.unwrap_err();
  assert!(matches!(
    core_err(&err),
    folio_core::Error::AuthorNotFound(_)
  ));

  h.teardown().await;
}

// ─── Crawl recording ─────────────────────────────────────────────────────────

#[tokio::test]
async fn record_crawl_stores_valid_rows_and_reports_rejects() {
  let Some(h) = Harness::connect("crawl").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  let crawled_at = Utc::now();

  let report = h
    .store
    .record_crawl(
      author.author_id,
      vec![
        publication("On Computation", Some(1843)),
        publication("Notes on the Engine", None),
        publication("Corrupt Scrape", Some(-5)),
      ],
      crawled_at,
    )
    .await
    .unwrap();

  assert_eq!(report.stored, 2);
  assert_eq!(report.rejected.len(), 1);
  assert_eq!(report.rejected[0].title, "Corrupt Scrape");
  assert_eq!(report.rejected[0].reason, folio_core::Error::InvalidYear(-5));

  let stored = h.store.publications_for(author.author_id).await.unwrap();
  assert_eq!(stored.len(), 2);

  let fetched = h.store.get_author(author.author_id).await.unwrap().unwrap();
  assert!(close(fetched.last_crawl.unwrap(), crawled_at));

  h.teardown().await;
}

#[tokio::test]
async fn record_crawl_for_unknown_author_leaves_no_trace() {
  let Some(h) = Harness::connect("crawl_unknown").await else { return };

  let err = h
    .store
    .record_crawl(
      99_999,
      vec![publication("Ghost Paper", Some(2020))],
      Utc::now(),
    )
    .await
    .unwrap_err();
  assert!(matches!(
    core_err(&err),
    folio_core::Error::AuthorNotFound(99_999)
  ));

  h.teardown().await;
}

#[tokio::test]
async fn touch_last_crawl_requires_an_existing_author() {
  let Some(h) = Harness::connect("touch").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  let at = Utc::now();
  h.store.touch_last_crawl(author.author_id, at).await.unwrap();
  let fetched = h.store.get_author(author.author_id).await.unwrap().unwrap();
  assert!(close(fetched.last_crawl.unwrap(), at));

  let err = h.store.touch_last_crawl(99_999, at).await.unwrap_err();
  assert!(matches!(
    core_err(&err),
    folio_core::Error::AuthorNotFound(99_999)
  ));

  h.teardown().await;
}

// ─── Crawl scheduling feed ───────────────────────────────────────────────────

#[tokio::test]
async fn due_feed_follows_the_per_source_cadence() {
  let Some(h) = Harness::connect("due_feed").await else { return };
  let now = Utc::now();

  let never = h.store.add_author(ada()).await.unwrap();

  let stale_google = h
    .store
    .add_author(NewAuthor {
      name:        "Stale Google".into(),
      source:      Source::Google,
      profile_url: "http://g".into(),
    })
    .await
    .unwrap();
  h.store
    .touch_last_crawl(stale_google.author_id, now - Duration::days(8))
    .await
    .unwrap();

  // 10 days is stale for google but fresh for dblp's 30-day cadence.
  let fresh_dblp = h.store.add_author(dblp_author("Fresh Dblp")).await.unwrap();
  h.store
    .touch_last_crawl(fresh_dblp.author_id, now - Duration::days(10))
    .await
    .unwrap();

  let due = h
    .store
    .authors_due_for_crawl(now, CrawlIntervals::default())
    .await
    .unwrap();
  let due_ids: Vec<i64> = due.iter().map(|a: &Author| a.author_id).collect();

  assert!(due_ids.contains(&never.author_id));
  assert!(due_ids.contains(&stale_google.author_id));
  assert!(!due_ids.contains(&fresh_dblp.author_id));

  // Never-crawled authors are served first.
  assert_eq!(due[0].author_id, never.author_id);

  h.teardown().await;
}

// ─── Monitoring projection ───────────────────────────────────────────────────

#[tokio::test]
async fn author_status_counts_publications_per_author() {
  let Some(h) = Harness::connect("status").await else { return };

  let a1 = h.store.add_author(ada()).await.unwrap();
  let a2 = h.store.add_author(dblp_author("Charles Babbage")).await.unwrap();

  for title in ["P1", "P2", "P3"] {
    h.store
      .record_publication(a1.author_id, publication(title, Some(1843)))
      .await
      .unwrap();
  }

  let status = h.store.author_status().await.unwrap();
  assert_eq!(status.len(), 2);

  let s1 = status.iter().find(|s| s.author_id == a1.author_id).unwrap();
  let s2 = status.iter().find(|s| s.author_id == a2.author_id).unwrap();
  assert_eq!(s1.publication_count, 3);
  assert_eq!(s2.publication_count, 0);
  assert!(s2.last_crawl.is_none());

  h.teardown().await;
}

// ─── Maintenance ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn purge_removes_only_aged_rows_and_is_idempotent() {
  let Some(h) = Harness::connect("purge").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  h.store
    .record_publication(author.author_id, publication("Old Paper", Some(1843)))
    .await
    .unwrap();
  h.store
    .record_publication(author.author_id, publication("New Paper", Some(2024)))
    .await
    .unwrap();

  // Backdate one row past the retention horizon.
  sqlx::query(
    "UPDATE publications SET updated_at = now() - interval '400 days'
     WHERE title = $1",
  )
  .bind("Old Paper")
  .execute(h.store.pool())
  .await
  .unwrap();

  let purged = h
    .store
    .purge_stale_publications(Duration::days(365))
    .await
    .unwrap();
  assert_eq!(purged, 1);

  let remaining = h.store.publications_for(author.author_id).await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].title, "New Paper");

  // Parent author is untouched even when left with zero publications.
  assert!(h.store.get_author(author.author_id).await.unwrap().is_some());

  let again = h
    .store
    .purge_stale_publications(Duration::days(365))
    .await
    .unwrap();
  assert_eq!(again, 0);

  h.teardown().await;
}

#[tokio::test]
async fn reclaim_storage_never_changes_results() {
  use crate::bootstrap::{AccessPolicy, Provisioner};

  let Some(h) = Harness::connect("reclaim").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  h.store
    .record_publication(author.author_id, publication("Kept", Some(2024)))
    .await
    .unwrap();

  // Reclamation belongs to the provisioning side; the harness pool owns the
  // test schema's tables, so it stands in for that identity here.
  let policy = AccessPolicy {
    database:         "postgres".into(),
    schema:           h.schema.clone(),
    runtime_role:     "unused".into(),
    runtime_password: "unused".into(),
  };
  let provisioner = Provisioner::new(h.store.pool().clone(), policy);
  provisioner.reclaim_storage().await.unwrap();

  let pubs = h.store.publications_for(author.author_id).await.unwrap();
  assert_eq!(pubs.len(), 1);
  assert_eq!(pubs[0].title, "Kept");

  h.teardown().await;
}

// ─── Index layer ─────────────────────────────────────────────────────────────

// Indexes must not change results, only cost; the functional tests above all
// pass with or without them. This asserts the plan side: with sequential
// scans disabled, the parent join resolves through an index.
#[tokio::test]
async fn parent_join_resolves_through_an_index() {
  let Some(h) = Harness::connect("plan").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  h.store
    .record_publication(author.author_id, publication("Indexed", Some(2024)))
    .await
    .unwrap();

  let mut tx = h.store.pool().begin().await.unwrap();
  sqlx::raw_sql("SET LOCAL enable_seqscan = off")
    .execute(&mut *tx)
    .await
    .unwrap();
  let plan: Vec<String> = sqlx::query_scalar(
    "EXPLAIN SELECT title FROM publications WHERE author_id = $1",
  )
  .bind(author.author_id)
  .fetch_all(&mut *tx)
  .await
  .unwrap();
  tx.rollback().await.unwrap();

  let plan = plan.join("\n");
  assert!(plan.contains("Index"), "expected an index scan, got:\n{plan}");
  assert!(!plan.contains("Seq Scan"), "unexpected seq scan:\n{plan}");

  h.teardown().await;
}

// Same assertion for the retention path: the purge predicate over
// `updated_at` must be able to resolve through its dedicated index.
#[tokio::test]
async fn retention_cutoff_resolves_through_the_updated_at_index() {
  let Some(h) = Harness::connect("retention_plan").await else { return };

  let author = h.store.add_author(ada()).await.unwrap();
  h.store
    .record_publication(author.author_id, publication("Aged", Some(2020)))
    .await
    .unwrap();

  let mut tx = h.store.pool().begin().await.unwrap();
  sqlx::raw_sql("SET LOCAL enable_seqscan = off")
    .execute(&mut *tx)
    .await
    .unwrap();
  let plan: Vec<String> = sqlx::query_scalar(
    "EXPLAIN SELECT publication_id FROM publications WHERE updated_at < $1",
  )
  .bind(Utc::now() - Duration::days(365))
  .fetch_all(&mut *tx)
  .await
  .unwrap();
  tx.rollback().await.unwrap();

  let plan = plan.join("\n");
  assert!(
    plan.contains("publications_updated_idx"),
    "expected the updated_at index, got:\n{plan}"
  );
  assert!(!plan.contains("Seq Scan"), "unexpected seq scan:\n{plan}");

  h.teardown().await;
}

// ─── Access control ──────────────────────────────────────────────────────────

// Full bootstrap round trip: provision a throwaway runtime role, then prove
// the privilege boundary from the runtime side — CRUD allowed, DDL refused.
#[tokio::test]
async fn bootstrap_grants_crud_but_withholds_ddl() {
  use sqlx::{Connection as _, PgConnection};

  use crate::bootstrap::{AccessPolicy, Provisioner, verify_runtime_on};

  let Some(h) = Harness::connect("bootstrap").await else { return };
  let url = std::env::var("FOLIO_TEST_DATABASE_URL").unwrap();
  let base = PgConnectOptions::from_str(&url).unwrap();

  let role = format!("folio_rt_{}", std::process::id());
  let policy = AccessPolicy {
    database:         base.get_database().unwrap_or("postgres").to_owned(),
    schema:           h.schema.clone(),
    runtime_role:     role.clone(),
    runtime_password: "folio_test".into(),
  };

  // The harness pool connects as the privileged test user, which stands in
  // for the provisioning identity here.
  let provisioner = Provisioner::new(h.store.pool().clone(), policy);
  provisioner.bootstrap().await.unwrap();
  // Re-running the sequence must be harmless.
  provisioner.bootstrap().await.unwrap();

  let runtime_options = base
    .clone()
    .username(&role)
    .password("folio_test")
    .options([("search_path", h.schema.as_str())]);
  let mut conn = PgConnection::connect_with(&runtime_options).await.unwrap();
  verify_runtime_on(&mut conn).await.unwrap();
  drop(conn);

  // Reclamation as the owner must actually process both tables — a VACUUM
  // issued by a non-owner skips them with a warning while still reporting
  // success, so the outcome has to be checked in pg_stat, not inferred from
  // the call succeeding. Stats publication can lag the command slightly.
  provisioner.reclaim_storage().await.unwrap();
  let mut vacuumed: i64 = 0;
  for _ in 0..50 {
    vacuumed = sqlx::query_scalar(
      "SELECT COUNT(*) FROM pg_stat_all_tables
       WHERE schemaname = $1
         AND relname IN ('authors', 'publications')
         AND vacuum_count > 0",
    )
    .bind(&h.schema)
    .fetch_one(h.store.pool())
    .await
    .unwrap();
    if vacuumed == 2 {
      break;
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
  }
  assert_eq!(vacuumed, 2, "vacuum skipped tables it should have processed");

  // Drop the role's grants (including its default-privileges entries)
  // before the role itself.
  sqlx::raw_sql(&format!(
    "DROP OWNED BY \"{role}\"; DROP ROLE \"{role}\";"
  ))
  .execute(h.store.pool())
  .await
  .unwrap();

  h.teardown().await;
}
