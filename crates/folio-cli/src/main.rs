//! `folio` — operator CLI for the folio publication store.
//!
//! Reads `folio.toml` (or the path given with `--config`, overridable with
//! `FOLIO_`-prefixed environment variables) and runs one provisioning,
//! registration, monitoring, or maintenance command against the store.
//!
//! # Example config
//!
//! ```toml
//! [store]
//! host     = "localhost"
//! database = "publication_db"
//!
//! [store.provisioning]
//! user     = "folio_admin"
//! password = "…"
//!
//! [store.runtime]
//! user     = "folio_app"
//! password = "…"
//!
//! [crawl]
//! google_days = 7
//! dblp_days   = 30
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use folio_core::{
  author::{CrawlIntervals, NewAuthor},
  source::Source,
  store::PublicationStore,
};
use folio_store_postgres::{PgStore, Provisioner, StoreConfig, verify_runtime};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "folio", about = "Operator CLI for the folio publication store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "folio.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the database, the runtime role, the grants, and the schema
  /// (runs as the provisioning identity).
  Bootstrap,

  /// Check the privilege boundary from the runtime side: CRUD must work,
  /// DDL must be refused.
  Verify,

  /// Register a single author.
  AddAuthor {
    #[arg(long)]
    name: String,
    /// Provenance tag, e.g. "google" or "dblp".
    #[arg(long)]
    source: String,
    #[arg(long)]
    url: String,
  },

  /// Bulk-register authors from a TOML file (`[[authors]]` entries).
  /// Duplicates are skipped and reported; the batch never aborts.
  Seed { file: PathBuf },

  /// Crawl-progress report: recency and publication count per author.
  Status,

  /// Authors currently due for crawling, most overdue first.
  Due,

  /// Delete an author and, by cascade, all of its publications.
  DeleteAuthor {
    #[arg(long)]
    id: i64,
  },

  /// Delete publications not refreshed within the given age.
  Purge {
    /// Retention window in days; must be at least 1.
    #[arg(long, default_value_t = 365,
          value_parser = clap::value_parser!(i64).range(1..))]
    max_age_days: i64,
  },

  /// Reclaim storage and refresh planner statistics (runs as the
  /// provisioning identity, which owns the tables).
  Vacuum,
}

// ─── Config file ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FolioConfig {
  store: StoreConfig,
  #[serde(default)]
  crawl: CrawlConfig,
}

/// Re-crawl cadence in days, per source.
#[derive(Deserialize)]
#[serde(default)]
struct CrawlConfig {
  google_days: i64,
  dblp_days:   i64,
}

impl Default for CrawlConfig {
  fn default() -> Self {
    Self { google_days: 7, dblp_days: 30 }
  }
}

impl CrawlConfig {
  fn intervals(&self) -> CrawlIntervals {
    CrawlIntervals {
      google: Duration::days(self.google_days),
      dblp:   Duration::days(self.dblp_days),
    }
  }
}

/// Shape of the `seed` input file.
#[derive(Deserialize)]
struct SeedFile {
  authors: Vec<NewAuthor>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(true))
    .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
    .build()
    .context("failed to read config file")?;
  let cfg: FolioConfig = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;

  match cli.command {
    Command::Bootstrap => bootstrap(&cfg.store).await,
    Command::Verify => {
      verify_runtime(&cfg.store)
        .await
        .context("privilege verification failed")?;
      println!("runtime identity verified: CRUD granted, DDL refused");
      Ok(())
    }
    Command::AddAuthor { name, source, url } => {
      add_author(&cfg.store, name, source, url).await
    }
    Command::Seed { file } => seed(&cfg.store, &file).await,
    Command::Status => status(&cfg.store).await,
    Command::Due => due(&cfg).await,
    Command::DeleteAuthor { id } => delete_author(&cfg.store, id).await,
    Command::Purge { max_age_days } => purge(&cfg.store, max_age_days).await,
    Command::Vacuum => vacuum(&cfg.store).await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn bootstrap(store_cfg: &StoreConfig) -> Result<()> {
  Provisioner::create_database(store_cfg)
    .await
    .context("failed to create database")?;
  let provisioner = Provisioner::connect(store_cfg)
    .await
    .context("failed to connect as the provisioning identity")?;
  provisioner.bootstrap().await.context("bootstrap failed")?;
  println!("bootstrap complete");
  Ok(())
}

async fn add_author(
  store_cfg: &StoreConfig,
  name: String,
  source: String,
  url: String,
) -> Result<()> {
  let store = connect(store_cfg).await?;
  let author = store
    .add_author(NewAuthor {
      name,
      source: Source::from(source),
      profile_url: url,
    })
    .await?;
  println!(
    "registered author {} — {} ({})",
    author.author_id, author.name, author.source
  );
  Ok(())
}

async fn seed(store_cfg: &StoreConfig, file: &PathBuf) -> Result<()> {
  let text = std::fs::read_to_string(file)
    .with_context(|| format!("failed to read {}", file.display()))?;
  let seed: SeedFile = toml::from_str(&text)
    .with_context(|| format!("failed to parse {}", file.display()))?;

  let store = connect(store_cfg).await?;

  // Per-row outcome reporting: a duplicate or malformed entry never aborts
  // the rest of the batch.
  let (mut added, mut skipped, mut failed) = (0u32, 0u32, 0u32);
  for author in seed.authors {
    let label = format!("{} ({})", author.name, author.source);
    match store.add_author(author).await {
      Ok(a) => {
        added += 1;
        tracing::info!("registered {label} as author {}", a.author_id);
      }
      Err(e)
        if matches!(
          e.as_core(),
          Some(folio_core::Error::DuplicateAuthor { .. })
        ) =>
      {
        skipped += 1;
        tracing::warn!("already registered, skipping: {label}");
      }
      Err(e) => {
        failed += 1;
        tracing::error!("failed to register {label}: {e}");
      }
    }
  }

  println!("seeded {added} authors ({skipped} duplicates skipped, {failed} failed)");
  Ok(())
}

async fn status(store_cfg: &StoreConfig) -> Result<()> {
  let store = connect(store_cfg).await?;
  let statuses = store.author_status().await?;

  println!(
    "{:<30} {:<10} {:<20} {:>12}",
    "Author", "Source", "Last crawl", "Publications"
  );
  println!("{}", "-".repeat(76));
  for s in &statuses {
    println!(
      "{:<30} {:<10} {:<20} {:>12}",
      s.name,
      s.source.as_str(),
      format_last_crawl(s.last_crawl),
      s.publication_count
    );
  }
  println!("{}", "-".repeat(76));
  println!("{} authors", statuses.len());
  Ok(())
}

async fn due(cfg: &FolioConfig) -> Result<()> {
  let store = connect(&cfg.store).await?;
  let due = store
    .authors_due_for_crawl(Utc::now(), cfg.crawl.intervals())
    .await?;

  for author in &due {
    println!(
      "{:<8} {:<30} {:<10} last crawl: {}",
      author.author_id,
      author.name,
      author.source.as_str(),
      format_last_crawl(author.last_crawl)
    );
  }
  println!("{} authors due for crawling", due.len());
  Ok(())
}

async fn delete_author(store_cfg: &StoreConfig, id: i64) -> Result<()> {
  let store = connect(store_cfg).await?;
  store.delete_author(id).await?;
  println!("deleted author {id} and its publications");
  Ok(())
}

async fn purge(store_cfg: &StoreConfig, max_age_days: i64) -> Result<()> {
  let store = connect(store_cfg).await?;
  let purged = store
    .purge_stale_publications(Duration::days(max_age_days))
    .await?;
  println!("purged {purged} publications older than {max_age_days} days");
  Ok(())
}

async fn vacuum(store_cfg: &StoreConfig) -> Result<()> {
  // VACUUM silently skips tables its caller does not own, so this must run
  // as the provisioning identity rather than the runtime one.
  let provisioner = Provisioner::connect(store_cfg)
    .await
    .context("failed to connect as the provisioning identity")?;
  provisioner.reclaim_storage().await?;
  println!("storage reclaimed, statistics refreshed");
  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn connect(store_cfg: &StoreConfig) -> Result<PgStore> {
  PgStore::connect(store_cfg)
    .await
    .context("failed to connect as the runtime identity")
}

fn format_last_crawl(at: Option<chrono::DateTime<Utc>>) -> String {
  match at {
    Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
    None => "never".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn crawl_cadence_defaults_match_the_pipeline() {
    let cfg = CrawlConfig::default();
    let intervals = cfg.intervals();
    assert_eq!(intervals.google, Duration::days(7));
    assert_eq!(intervals.dblp, Duration::days(30));
  }

  #[test]
  fn purge_refuses_a_window_that_would_empty_the_store() {
    // A zero or negative retention window would delete every publication.
    for bad in ["0", "-1"] {
      let parsed =
        Cli::try_parse_from(["folio", "purge", "--max-age-days", bad]);
      assert!(parsed.is_err(), "max_age_days = {bad} must be rejected");
    }

    let parsed = Cli::try_parse_from(["folio", "purge", "--max-age-days", "1"]);
    assert!(parsed.is_ok());
  }

  #[test]
  fn seed_file_parses_author_entries() {
    let seed: SeedFile = toml::from_str(
      r#"
        [[authors]]
        name        = "Ciprian Dobre"
        source      = "dblp"
        profile_url = "https://dblp.example/dobre"

        [[authors]]
        name        = "Ciprian Dobre"
        source      = "google"
        profile_url = "https://scholar.example/dobre"
      "#,
    )
    .unwrap();

    assert_eq!(seed.authors.len(), 2);
    assert_eq!(seed.authors[0].source, Source::Dblp);
    assert_eq!(seed.authors[1].source, Source::Google);
  }
}
