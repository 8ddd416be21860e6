//! Top-level facade crate for chainscrape.
//!
//! Re-exports the core primitives and the exporter library so users can depend on a single crate.

pub mod core {
    pub use chainscrape_core::*;
}

pub mod exporter {
    pub use chainscrape_exporter::*;
}
