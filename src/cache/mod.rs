//! Fast-join caches
//!
//! One [`HevcCache`] lives per video stream. The ingest path feeds it every
//! packet; the join path replays it into each new subscriber's queue.

pub mod config;
pub mod hevc;

pub use config::CacheConfig;
pub use hevc::{CacheStats, HevcCache};
