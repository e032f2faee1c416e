//! # Strand Graph
//!
//! The conversation-graph engine: reply trees, quote edges, bounded
//! neighborhood views, and deterministic text rendering.
//!
//! ## Architecture
//!
//! ```text
//! PostStore
//!     │
//!     ├──> QuoteIndex (batch, once)
//!     │      └─ quoted id -> quoting ids, self-quotes excluded
//!     │
//!     ├──> TreeBuilder (batch, once)
//!     │      ├─ complete conversations (shared conversation id)
//!     │      └─ incomplete reply chains (cycle-guarded, depth-capped)
//!     │
//!     ├──> NeighborhoodFilter (per strand request)
//!     │      └─ seeds + ancestors/descendants within depth bounds
//!     │
//!     └──> StrandRenderer (per strand request)
//!            ├─ sorted forests, box-drawing connectors
//!            ├─ nested quote blocks
//!            └─ deferred annex expansion, duplicate-free
//! ```
//!
//! Everything here is pure and synchronous: no I/O, no locking. The batch
//! structures are built once and then shared read-only across concurrent
//! strand computations.

mod builder;
mod error;
mod filter;
mod quotes;
mod render;
mod types;

pub use builder::TreeBuilder;
pub use error::{GraphError, Result};
pub use filter::{filter_trees, DepthBounds};
pub use quotes::QuoteIndex;
pub use render::{default_header, StrandRenderer};
pub use types::{ConversationKey, ConversationTree, FilteredTree, ParentLink};
