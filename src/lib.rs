//! Fast-join GOP cache for HEVC over RTP
//!
//! A viewer that subscribes to a live HEVC stream mid-GOP cannot decode
//! anything until the next keyframe. This crate keeps the most recent
//! VPS/SPS/PPS packets and the current GOP so they can be replayed into the
//! new subscriber's queue at join time.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use hevc_gopcache::cache::HevcCache;
//! use hevc_gopcache::rtp::{Channel, RtpPacket, SyncQueue};
//!
//! # async fn run(datagrams: Vec<Bytes>) -> hevc_gopcache::Result<()> {
//! let cache = Arc::new(HevcCache::new(true));
//!
//! for data in datagrams {
//!     let packet = RtpPacket::parse(Channel::Video, data)?;
//!     cache.ingest(packet).await;
//! }
//!
//! let queue = SyncQueue::new();
//! let bytes = cache.replay(&queue).await;
//! tracing::info!(bytes, "subscriber primed");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod media;
pub mod rtp;

pub use cache::{CacheConfig, CacheStats, HevcCache};
pub use error::{Error, Result, RtpError};
pub use media::{GopBuffer, NalUnitType, PayloadKind};
pub use rtp::{Channel, PacketSink, RtpPacket, SyncQueue};
