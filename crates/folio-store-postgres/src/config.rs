//! Connection configuration for the two database identities.
//!
//! The provisioning identity owns every object and is used only by the
//! bootstrap path; the runtime identity is what crawler and monitor
//! processes connect as. Both sets of credentials live in one explicit
//! struct handed to the layer's constructors — there is no hidden global.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Login credentials for one database role.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
  pub user:     String,
  pub password: String,
}

/// Full store configuration, deserialised from the operator's TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  pub host:         String,
  #[serde(default = "default_port")]
  pub port:         u16,
  pub database:     String,
  /// Namespace the tables live in. The grants and the default-privileges
  /// policy are scoped to this schema.
  #[serde(default = "default_schema")]
  pub schema:       String,
  pub provisioning: Credentials,
  pub runtime:      Credentials,
  #[serde(default = "default_max_connections")]
  pub max_connections:      u32,
  #[serde(default = "default_acquire_timeout_secs")]
  pub acquire_timeout_secs: u64,
}

fn default_port() -> u16 { 5432 }
fn default_schema() -> String { "public".to_owned() }
fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout_secs() -> u64 { 10 }

impl StoreConfig {
  /// Options for the restricted runtime identity (ordinary CRUD).
  pub fn runtime_options(&self) -> PgConnectOptions {
    self.options(&self.runtime).database(&self.database)
  }

  /// Options for the provisioning identity against the target database.
  pub fn provisioning_options(&self) -> PgConnectOptions {
    self.options(&self.provisioning).database(&self.database)
  }

  /// Options for the provisioning identity against the `postgres`
  /// maintenance database — the only place `CREATE DATABASE` can run.
  pub fn maintenance_options(&self) -> PgConnectOptions {
    self.options(&self.provisioning).database("postgres")
  }

  pub fn acquire_timeout(&self) -> Duration {
    Duration::from_secs(self.acquire_timeout_secs)
  }

  fn options(&self, creds: &Credentials) -> PgConnectOptions {
    PgConnectOptions::new()
      .host(&self.host)
      .port(self.port)
      .username(&creds.user)
      .password(&creds.password)
      .options([("search_path", self.schema.as_str())])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_applied_when_fields_are_omitted() {
    let cfg: StoreConfig = serde_json::from_value(serde_json::json!({
      "host": "localhost",
      "database": "publication_db",
      "provisioning": { "user": "folio_admin", "password": "a" },
      "runtime":      { "user": "folio_app",   "password": "b" },
    }))
    .unwrap();

    assert_eq!(cfg.port, 5432);
    assert_eq!(cfg.schema, "public");
    assert_eq!(cfg.max_connections, 5);
    assert_eq!(cfg.acquire_timeout(), Duration::from_secs(10));
  }
}
