//! Agenticlaw Memory — the hybrid vector + keyword memory index (§4.11)
//! that agent runs recall against and the Trigger Engine's `reflection` and
//! `consolidate` cycles maintain.

pub mod index;
pub mod service;
pub mod types;

pub use index::{InMemoryKeywordIndex, InMemoryVectorIndex, KeywordIndex, VectorIndex};
pub use service::{ConsolidationConfig, ConsolidationReport, MemoryService};
pub use types::{
    MemoryEntry, MemoryFilter, MemoryStats, MemoryType, NewMemory, ScoredMemory, SearchMode,
    SearchQuery, VectorRef,
};
