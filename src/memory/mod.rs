pub mod arena;
pub mod contract;
pub mod mio0;

pub use arena::{Arena, ArenaHandle};
pub use contract::{Compression, ContentMemory, MemoryError, MemoryStats, SegmentService};
