//! Postgres backend for the folio publication store.
//!
//! Three concerns live here:
//!
//! - [`store::PgStore`] — the runtime-identity CRUD path implementing
//!   [`folio_core::store::PublicationStore`], including the atomic
//!   publication upsert and the retention purge.
//! - [`bootstrap`] — the provisioning-identity path: role creation, grants,
//!   the standing default-privileges policy, schema installation, and
//!   storage reclamation (VACUUM only processes tables its caller owns).
//! - [`config`] — explicit connection configuration for both identities;
//!   credentials are never read from process globals.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod schema;
mod store;

pub use bootstrap::{Provisioner, verify_runtime};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::PgStore;

#[cfg(test)]
mod tests;
