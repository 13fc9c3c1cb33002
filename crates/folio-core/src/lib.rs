//! Core types and trait definitions for the folio publication store.
//!
//! This crate is deliberately free of database dependencies. The backend
//! crate (`folio-store-postgres`) implements the [`store::PublicationStore`]
//! trait defined here; operator tooling depends on this abstraction, not on
//! any concrete backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod author;
pub mod error;
pub mod publication;
pub mod source;
pub mod store;

pub use error::{Error, Result};
