//! # Strand Store
//!
//! The post data model and the read-only store the rest of the pipeline
//! queries.
//!
//! Posts are loaded once from a snapshot (JSON lines), optionally enriched
//! with derived quote counts, and then never mutated. Every downstream
//! component (quote index, tree builders, renderer) holds a shared
//! reference to the same [`PostStore`].

mod error;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use store::PostStore;
pub use types::{MediaDescription, Post, PostId};
