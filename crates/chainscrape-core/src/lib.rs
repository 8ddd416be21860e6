//! chainscrape core: transport-agnostic primitives shared by the exporter.
//!
//! This crate defines the error taxonomy, arbitrary-precision amounts, the
//! value normalizer and the address codecs. It intentionally carries no
//! transport or runtime dependencies so the numeric and parsing rules can be
//! tested in isolation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `ExporterError`/`Result` so a malformed
//! upstream payload or query parameter never takes the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod address;
pub mod amount;
pub mod error;
pub mod normalize;

/// Shared result type.
pub use error::{ExporterError, Result};
