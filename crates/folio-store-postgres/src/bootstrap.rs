//! Provisioning-identity bootstrap: database, roles, grants, and schema.
//!
//! Two principals are in play. The *provisioning* identity creates the
//! database, the runtime role, and every schema object, and keeps ownership
//! of all of them. The *runtime* identity — what crawler and monitor
//! processes connect as — receives row-level CRUD grants plus a standing
//! default-privileges policy covering tables and sequences created in the
//! future, so schema evolutions stay secure without per-object grants.
//!
//! Ownership is never transferred to the runtime role: an owner can redefine
//! its tables, which would hand a compromised crawler process DDL rights.

use sqlx::{
  Connection as _, PgConnection,
  postgres::{PgPool, PgPoolOptions},
};

use crate::{Error, Result, config::StoreConfig, schema::SCHEMA};

// ─── SQL quoting ─────────────────────────────────────────────────────────────

// Role, schema, and database names cannot be bound as statement parameters;
// they are spliced as quoted identifiers instead.

fn quote_ident(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// What the bootstrap installs: the namespace and the restricted role.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
  pub database:         String,
  pub schema:           String,
  pub runtime_role:     String,
  pub runtime_password: String,
}

impl AccessPolicy {
  pub fn from_config(config: &StoreConfig) -> Self {
    Self {
      database:         config.database.clone(),
      schema:           config.schema.clone(),
      runtime_role:     config.runtime.user.clone(),
      runtime_password: config.runtime.password.clone(),
    }
  }
}

// ─── Provisioner ─────────────────────────────────────────────────────────────

/// Runs the bootstrap sequence as the provisioning identity.
pub struct Provisioner {
  pool:   PgPool,
  policy: AccessPolicy,
}

impl Provisioner {
  /// Connect to the target database as the provisioning identity.
  pub async fn connect(config: &StoreConfig) -> Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(1)
      .acquire_timeout(config.acquire_timeout())
      .connect_with(config.provisioning_options())
      .await?;
    Ok(Self::new(pool, AccessPolicy::from_config(config)))
  }

  pub fn new(pool: PgPool, policy: AccessPolicy) -> Self {
    Self { pool, policy }
  }

  /// Create the target database if it does not exist yet, owned by the
  /// provisioning identity. `CREATE DATABASE` cannot run inside a
  /// transaction or against the target itself, so this connects to the
  /// `postgres` maintenance database.
  pub async fn create_database(config: &StoreConfig) -> Result<()> {
    let mut conn =
      PgConnection::connect_with(&config.maintenance_options()).await?;

    let exists: bool = sqlx::query_scalar(
      "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
    )
    .bind(&config.database)
    .fetch_one(&mut conn)
    .await?;

    if exists {
      tracing::info!(database = %config.database, "database already exists");
      return Ok(());
    }

    let sql = format!(
      "CREATE DATABASE {} OWNER {}",
      quote_ident(&config.database),
      quote_ident(&config.provisioning.user),
    );
    sqlx::raw_sql(&sql).execute(&mut conn).await?;
    tracing::info!(database = %config.database, "created database");
    Ok(())
  }

  /// The full bootstrap sequence. Idempotent: safe to re-run against an
  /// already-provisioned store.
  pub async fn bootstrap(&self) -> Result<()> {
    self.ensure_schema().await?;
    self.create_runtime_role().await?;
    self.grant_connection().await?;
    self.establish_default_privileges().await?;
    self.install_schema().await?;
    self.grant_existing_objects().await?;
    tracing::info!(
      schema = %self.policy.schema,
      runtime_role = %self.policy.runtime_role,
      "bootstrap complete"
    );
    Ok(())
  }

  async fn ensure_schema(&self) -> Result<()> {
    let sql = format!(
      "CREATE SCHEMA IF NOT EXISTS {}",
      quote_ident(&self.policy.schema)
    );
    sqlx::raw_sql(&sql).execute(&self.pool).await?;
    Ok(())
  }

  /// Create the runtime login role if it is missing. An existing role is
  /// left untouched (password rotation is an operator concern, not ours).
  async fn create_runtime_role(&self) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
      "SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)",
    )
    .bind(&self.policy.runtime_role)
    .fetch_one(&self.pool)
    .await?;

    if exists {
      tracing::info!(role = %self.policy.runtime_role, "runtime role already exists");
      return Ok(());
    }

    let sql = format!(
      "CREATE ROLE {} LOGIN PASSWORD {}",
      quote_ident(&self.policy.runtime_role),
      quote_literal(&self.policy.runtime_password),
    );
    sqlx::raw_sql(&sql).execute(&self.pool).await?;
    tracing::info!(role = %self.policy.runtime_role, "created runtime role");
    Ok(())
  }

  async fn grant_connection(&self) -> Result<()> {
    let role = quote_ident(&self.policy.runtime_role);
    let sql = format!(
      "GRANT CONNECT ON DATABASE {} TO {role};
       GRANT USAGE ON SCHEMA {} TO {role};",
      quote_ident(&self.policy.database),
      quote_ident(&self.policy.schema),
    );
    sqlx::raw_sql(&sql).execute(&self.pool).await?;
    Ok(())
  }

  /// The standing default-privileges policy: any table or sequence the
  /// provisioning identity creates under this schema from now on grants the
  /// runtime role row-level CRUD automatically. Because this runs *before*
  /// [`Self::install_schema`], the initial tables are covered by it too.
  async fn establish_default_privileges(&self) -> Result<()> {
    let role   = quote_ident(&self.policy.runtime_role);
    let schema = quote_ident(&self.policy.schema);
    let sql = format!(
      "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema}
         GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {role};
       ALTER DEFAULT PRIVILEGES IN SCHEMA {schema}
         GRANT USAGE, SELECT ON SEQUENCES TO {role};"
    );
    sqlx::raw_sql(&sql).execute(&self.pool).await?;
    Ok(())
  }

  async fn install_schema(&self) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
    Ok(())
  }

  /// Non-destructive housekeeping pass: space reclamation and a statistics
  /// refresh. Never changes query results.
  ///
  /// This lives on the provisioner rather than the store because VACUUM
  /// only processes tables its caller owns — run by anyone else, Postgres
  /// skips them with a warning and still reports success. The provisioning
  /// identity keeps ownership of every object, so it is the one principal
  /// that can actually do the work.
  pub async fn reclaim_storage(&self) -> Result<()> {
    // VACUUM cannot run inside a transaction block, hence the simple query
    // protocol on a bare pool connection.
    sqlx::raw_sql("VACUUM (ANALYZE) authors, publications")
      .execute(&self.pool)
      .await?;
    tracing::info!("reclaimed storage and refreshed statistics");
    Ok(())
  }

  /// Explicit grants on the objects that exist right now. Redundant for
  /// tables created after the default-privileges policy, but covers a
  /// bootstrap re-run against a store installed before the policy existed.
  async fn grant_existing_objects(&self) -> Result<()> {
    let role = quote_ident(&self.policy.runtime_role);
    let sql = format!(
      "GRANT SELECT, INSERT, UPDATE, DELETE
         ON TABLE authors, publications TO {role};
       GRANT USAGE, SELECT
         ON SEQUENCE authors_author_id_seq, publications_publication_id_seq
         TO {role};"
    );
    sqlx::raw_sql(&sql).execute(&self.pool).await?;
    Ok(())
  }
}

// ─── Verification ────────────────────────────────────────────────────────────

/// Connect as the runtime identity and check both sides of the privilege
/// boundary: row-level CRUD must work, redefining a table must not.
pub async fn verify_runtime(config: &StoreConfig) -> Result<()> {
  let mut conn = PgConnection::connect_with(&config.runtime_options()).await?;
  verify_runtime_on(&mut conn).await
}

/// Verification body, separated so tests can supply their own connection.
pub async fn verify_runtime_on(conn: &mut PgConnection) -> Result<()> {
  // CRUD probe inside a rolled-back transaction — verification leaves no
  // rows behind.
  let mut tx = conn.begin().await?;

  sqlx::query(
    "INSERT INTO authors (name, source, profile_url) VALUES ($1, $2, $3)",
  )
  .bind("__folio_verify__")
  .bind("probe")
  .bind("probe://verify")
  .execute(&mut *tx)
  .await
  .map_err(|e| Error::Verification(format!("runtime INSERT refused: {e}")))?;

  sqlx::query("UPDATE authors SET last_crawl = now() WHERE name = $1")
    .bind("__folio_verify__")
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::Verification(format!("runtime UPDATE refused: {e}")))?;

  sqlx::query("DELETE FROM authors WHERE name = $1")
    .bind("__folio_verify__")
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::Verification(format!("runtime DELETE refused: {e}")))?;

  let _count: i64 =
    sqlx::query_scalar("SELECT COUNT(*) FROM publications")
      .fetch_one(&mut *tx)
      .await
      .map_err(|e| Error::Verification(format!("runtime SELECT refused: {e}")))?;

  tx.rollback().await?;

  // The DDL probe runs in its own transaction so that a misconfigured setup
  // where it *succeeds* is still undone.
  let mut tx = conn.begin().await?;
  let ddl =
    sqlx::query("ALTER TABLE authors ADD COLUMN folio_verify_probe integer")
      .execute(&mut *tx)
      .await;
  tx.rollback().await?;

  match ddl {
    Ok(_) => Err(Error::Verification(
      "runtime identity can alter table definitions; \
       ownership was transferred or grants are too broad"
        .into(),
    )),
    Err(e) if is_insufficient_privilege(&e) => Ok(()),
    Err(e) => Err(e.into()),
  }
}

/// SQLSTATE 42501.
fn is_insufficient_privilege(e: &sqlx::Error) -> bool {
  e.as_database_error()
    .and_then(|d| d.code())
    .is_some_and(|code| code == "42501")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identifiers_are_double_quoted() {
    assert_eq!(quote_ident("folio_app"), "\"folio_app\"");
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
  }

  #[test]
  fn literals_escape_single_quotes() {
    assert_eq!(quote_literal("pa'ss"), "'pa''ss'");
  }
}
