//! # Strand Search
//!
//! External collaborators and strand orchestration.
//!
//! The graph core is pure; everything that talks to the network lives
//! here behind async traits: the semantic-search service and the
//! media-description service. [`StrandAssembler`] composes seed
//! discovery, the neighborhood filter, and the renderer into one strand
//! per request, with bounded concurrency for batches.

mod assembler;
mod error;
mod media;
mod retry;
mod seeds;
mod semantic;

pub use assembler::{Strand, StrandAssembler, StrandConfig, StrandContext};
pub use error::{Result, SearchError};
pub use media::{HttpMediaDescriber, MediaCache, MediaDescriber};
pub use retry::with_retry;
pub use seeds::{dedupe_seeds, SeedProvenance, StrandSeed};
pub use semantic::{HttpSemanticSearch, SearchHit, SearchRequest, SemanticSearch};
