//! chainscrape exporter library entry.
//!
//! This crate wires config, upstream adapters, the fan-out scheduler, the
//! per-request metric set and the HTTP handlers into one service. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod error;
pub mod exposition;
pub mod fanout;
pub mod handlers;
pub mod metric_set;
pub mod obs;
pub mod ops;
pub mod router;
pub mod sources;
