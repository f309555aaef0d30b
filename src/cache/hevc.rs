//! HEVC fast-join cache
//!
//! Keeps the latest VPS, SPS and PPS packets and, when enabled, every packet
//! since the most recent keyframe. A subscriber joining mid-stream gets these
//! replayed into its queue and can start decoding without waiting for the
//! next keyframe.
//!
//! # Concurrency
//!
//! One ingest task writes, any number of join handlers read:
//!
//! ```text
//!   [ingest]                        [join]   [join]
//!   ingest(pkt) ──write──► RwLock<CachedState> ◄──read── replay(queue)
//! ```
//!
//! Ingest must be called in arrival order from a single task per stream.

use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::media::gop::GopBuffer;
use crate::media::hevc::PayloadKind;
use crate::rtp::{PacketSink, RtpPacket};

use super::config::CacheConfig;

/// State guarded by the cache lock
#[derive(Debug, Default)]
struct CachedState {
    vps: Option<RtpPacket>,
    sps: Option<RtpPacket>,
    pps: Option<RtpPacket>,
    gop: GopBuffer,
}

/// Snapshot of what the cache currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub has_vps: bool,
    pub has_sps: bool,
    pub has_pps: bool,
    /// Packets in the GOP buffer
    pub gop_packet_count: usize,
    /// Bytes in the GOP buffer
    pub gop_size_bytes: usize,
    /// Bytes a replay would push right now
    pub replay_size_bytes: usize,
}

/// Per-stream HEVC parameter set and GOP cache
#[derive(Debug)]
pub struct HevcCache {
    config: CacheConfig,
    state: RwLock<CachedState>,
}

impl HevcCache {
    /// Create a cache, optionally buffering the latest GOP
    pub fn new(cache_gop: bool) -> Self {
        Self::with_config(CacheConfig::from(cache_gop))
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CachedState::default()),
        }
    }

    /// Whether the latest GOP is buffered
    pub fn cache_gop(&self) -> bool {
        self.config.gop_enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Feed one packet from the stream
    ///
    /// Returns true if the packet starts a keyframe, whether or not GOP
    /// buffering is enabled. Non-video packets are ignored.
    ///
    /// A packet carrying a parameter set is stored in exactly one slot,
    /// checked in VPS, SPS, PPS order, and reports false even if it also
    /// carries a keyframe slice.
    pub async fn ingest(&self, packet: RtpPacket) -> bool {
        if !packet.is_video() {
            return false;
        }

        let kind = PayloadKind::classify(packet.payload());

        let mut state = self.state.write().await;

        if kind.vps {
            debug!(size = packet.size(), "VPS updated");
            state.vps = Some(packet);
            return false;
        }
        if kind.sps {
            debug!(size = packet.size(), "SPS updated");
            state.sps = Some(packet);
            return false;
        }
        if kind.pps {
            debug!(size = packet.size(), "PPS updated");
            state.pps = Some(packet);
            return false;
        }

        if self.config.gop_enabled {
            if kind.keyframe {
                debug!(
                    previous_packets = state.gop.len(),
                    previous_bytes = state.gop.size(),
                    "Keyframe, starting new GOP"
                );
                state.gop.reset();
                state.gop.push(packet);
            } else if !state.gop.is_empty() {
                state.gop.push(packet);
            }
        }

        kind.keyframe
    }

    /// Push cached state into a new subscriber's queue
    ///
    /// Order is VPS, SPS, PPS, then the GOP in arrival order. Returns the
    /// total bytes pushed.
    pub async fn replay<S>(&self, queue: &S) -> usize
    where
        S: PacketSink + ?Sized,
    {
        let state = self.state.read().await;
        let mut bytes = 0;

        for packet in [&state.vps, &state.sps, &state.pps].into_iter().flatten() {
            bytes += packet.size();
            queue.push(packet.clone());
        }

        if self.config.gop_enabled && !state.gop.is_empty() {
            bytes += state.gop.size();
            queue.push_many(state.gop.elems());
        }

        trace!(
            gop_packets = state.gop.len(),
            bytes,
            queued = queue.len(),
            "Replayed cache"
        );

        bytes
    }

    /// Forget all parameter sets and the buffered GOP
    ///
    /// Call when the encoder restarts so stale parameter sets are never
    /// paired with a new GOP.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.vps = None;
        state.sps = None;
        state.pps = None;
        state.gop.reset();
        debug!("Cache reset");
    }

    /// True once a replay would let a decoder start
    ///
    /// Requires all three parameter sets, plus a GOP in progress when GOP
    /// buffering is enabled.
    pub async fn is_ready(&self) -> bool {
        let state = self.state.read().await;
        let params = state.vps.is_some() && state.sps.is_some() && state.pps.is_some();
        params && (!self.config.gop_enabled || !state.gop.is_empty())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let param_bytes: usize = [&state.vps, &state.sps, &state.pps]
            .into_iter()
            .flatten()
            .map(RtpPacket::size)
            .sum();
        let gop_bytes = if self.config.gop_enabled {
            state.gop.size()
        } else {
            0
        };

        CacheStats {
            has_vps: state.vps.is_some(),
            has_sps: state.sps.is_some(),
            has_pps: state.pps.is_some(),
            gop_packet_count: state.gop.len(),
            gop_size_bytes: state.gop.size(),
            replay_size_bytes: param_bytes + gop_bytes,
        }
    }
}

impl Default for HevcCache {
    fn default() -> Self {
        Self::with_config(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::media::hevc::{NAL_AP, NAL_FU, NAL_PPS, NAL_SPS, NAL_VPS};
    use crate::rtp::{Channel, SyncQueue};

    const IDR_W_RADL: u8 = 19;
    const CRA_NUT: u8 = 21;
    const TRAIL_R: u8 = 1;

    /// Single NAL unit packet of the given type, padded to `size` bytes.
    /// `tag` lands in the last byte so packets can be told apart.
    fn nal(nal_type: u8, size: usize, tag: u8) -> RtpPacket {
        assert!(size >= 3);
        let mut data = vec![0u8; size];
        data[0] = nal_type << 1;
        data[1] = 0x01;
        data[size - 1] = tag;
        RtpPacket::from_payload(Channel::Video, Bytes::from(data))
    }

    fn tag(packet: &RtpPacket) -> u8 {
        *packet.payload().last().unwrap()
    }

    fn tags(packets: &[RtpPacket]) -> Vec<u8> {
        packets.iter().map(tag).collect()
    }

    #[tokio::test]
    async fn test_parameter_sets_are_cached() {
        let cache = HevcCache::new(true);

        assert!(!cache.ingest(nal(NAL_VPS, 10, 1)).await);
        assert!(!cache.ingest(nal(NAL_SPS, 20, 2)).await);
        assert!(!cache.ingest(nal(NAL_PPS, 5, 3)).await);

        let stats = cache.stats().await;
        assert!(stats.has_vps && stats.has_sps && stats.has_pps);
        assert_eq!(stats.gop_packet_count, 0);

        let queue = SyncQueue::new();
        assert_eq!(cache.replay(&queue).await, 35);
        assert_eq!(tags(&queue.drain()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_latest_parameter_set_wins() {
        let cache = HevcCache::new(true);
        cache.ingest(nal(NAL_SPS, 10, 1)).await;
        cache.ingest(nal(NAL_SPS, 12, 2)).await;

        let queue = SyncQueue::new();
        assert_eq!(cache.replay(&queue).await, 12);
        assert_eq!(tags(&queue.drain()), vec![2]);
    }

    #[tokio::test]
    async fn test_keyframe_types_return_true() {
        let cache = HevcCache::new(true);
        for t in 16..=21 {
            assert!(cache.ingest(nal(t, 8, t)).await, "type {}", t);
        }
        assert!(!cache.ingest(nal(TRAIL_R, 8, 0)).await);
        assert!(!cache.ingest(nal(22, 8, 0)).await);
    }

    #[tokio::test]
    async fn test_non_video_is_ignored() {
        let cache = HevcCache::new(true);
        let mut data = vec![0u8; 8];
        data[0] = IDR_W_RADL << 1;
        let audio = RtpPacket::from_payload(Channel::Audio, Bytes::from(data.clone()));
        let rtcp = RtpPacket::from_payload(Channel::VideoControl, Bytes::from(data));

        assert!(!cache.ingest(audio).await);
        assert!(!cache.ingest(rtcp).await);

        let stats = cache.stats().await;
        assert_eq!(stats.gop_packet_count, 0);
        assert_eq!(stats.replay_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_aggregated_sps_takes_precedence_over_keyframe() {
        let cache = HevcCache::new(true);
        let payload = vec![
            NAL_AP << 1, 0x01,
            0x00, 0x03, NAL_SPS << 1, 0x01, 0x01,
            0x00, 0x03, IDR_W_RADL << 1, 0x01, 0xAF,
        ];
        let packet = RtpPacket::from_payload(Channel::Video, Bytes::from(payload));

        assert!(!cache.ingest(packet.clone()).await);

        let stats = cache.stats().await;
        assert!(stats.has_sps);
        assert_eq!(stats.gop_packet_count, 0);

        let queue = SyncQueue::new();
        cache.replay(&queue).await;
        assert_eq!(queue.drain(), vec![packet]);
    }

    #[tokio::test]
    async fn test_aggregated_parameter_sets_fill_one_slot() {
        let cache = HevcCache::new(true);
        let payload = vec![
            NAL_AP << 1, 0x01,
            0x00, 0x02, NAL_VPS << 1, 0x01,
            0x00, 0x02, NAL_SPS << 1, 0x01,
            0x00, 0x02, NAL_PPS << 1, 0x01,
        ];
        cache
            .ingest(RtpPacket::from_payload(Channel::Video, Bytes::from(payload)))
            .await;

        let stats = cache.stats().await;
        assert!(stats.has_vps);
        assert!(!stats.has_sps);
        assert!(!stats.has_pps);
    }

    #[tokio::test]
    async fn test_fragment_continuation_never_classifies() {
        let cache = HevcCache::new(true);

        for fu_type in [NAL_VPS, NAL_SPS, NAL_PPS, IDR_W_RADL] {
            let packet = RtpPacket::from_payload(
                Channel::Video,
                Bytes::from(vec![NAL_FU << 1, 0x01, fu_type, 0xAA]),
            );
            assert!(!cache.ingest(packet).await);
        }

        let stats = cache.stats().await;
        assert!(!stats.has_vps && !stats.has_sps && !stats.has_pps);
        assert_eq!(stats.gop_packet_count, 0);

        let start = RtpPacket::from_payload(
            Channel::Video,
            Bytes::from(vec![NAL_FU << 1, 0x01, 0x80 | IDR_W_RADL, 0xAA]),
        );
        assert!(cache.ingest(start).await);

        // Continuation of the keyframe joins the GOP as a regular packet
        let cont = RtpPacket::from_payload(
            Channel::Video,
            Bytes::from(vec![NAL_FU << 1, 0x01, 0x40 | IDR_W_RADL, 0xBB]),
        );
        assert!(!cache.ingest(cont).await);
        assert_eq!(cache.stats().await.gop_packet_count, 2);
    }

    #[tokio::test]
    async fn test_gop_lifecycle() {
        let cache = HevcCache::new(true);

        // Nothing to anchor to yet
        assert!(!cache.ingest(nal(TRAIL_R, 10, 0)).await);
        assert_eq!(cache.stats().await.gop_packet_count, 0);

        assert!(cache.ingest(nal(IDR_W_RADL, 10, 1)).await);
        cache.ingest(nal(TRAIL_R, 10, 2)).await;
        cache.ingest(nal(TRAIL_R, 10, 3)).await;
        cache.ingest(nal(TRAIL_R, 10, 4)).await;

        let queue = SyncQueue::new();
        cache.replay(&queue).await;
        assert_eq!(tags(&queue.drain()), vec![1, 2, 3, 4]);

        assert!(cache.ingest(nal(CRA_NUT, 10, 5)).await);
        cache.ingest(nal(TRAIL_R, 10, 6)).await;

        cache.replay(&queue).await;
        assert_eq!(tags(&queue.drain()), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_parameter_sets_do_not_enter_gop() {
        let cache = HevcCache::new(true);
        cache.ingest(nal(IDR_W_RADL, 10, 1)).await;
        cache.ingest(nal(NAL_SPS, 10, 2)).await;
        cache.ingest(nal(TRAIL_R, 10, 3)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.gop_packet_count, 2);

        let queue = SyncQueue::new();
        cache.replay(&queue).await;
        assert_eq!(tags(&queue.drain()), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_replay_completeness() {
        let cache = HevcCache::new(true);
        cache.ingest(nal(NAL_VPS, 24, 1)).await;
        cache.ingest(nal(NAL_SPS, 40, 2)).await;
        cache.ingest(nal(NAL_PPS, 8, 3)).await;
        cache.ingest(nal(IDR_W_RADL, 1400, 4)).await;
        cache.ingest(nal(TRAIL_R, 300, 5)).await;
        cache.ingest(nal(TRAIL_R, 250, 6)).await;
        cache.ingest(nal(TRAIL_R, 200, 7)).await;

        let queue = SyncQueue::new();
        let bytes = cache.replay(&queue).await;

        assert_eq!(queue.len(), 7);
        assert_eq!(bytes, 24 + 40 + 8 + 1400 + 300 + 250 + 200);
        assert_eq!(tags(&queue.drain()), vec![1, 2, 3, 4, 5, 6, 7]);

        assert_eq!(cache.stats().await.replay_size_bytes, bytes);
    }

    #[tokio::test]
    async fn test_replay_leaves_cache_intact() {
        let cache = HevcCache::new(true);
        cache.ingest(nal(NAL_VPS, 10, 1)).await;
        cache.ingest(nal(IDR_W_RADL, 10, 2)).await;

        let first = SyncQueue::new();
        let second = SyncQueue::new();
        assert_eq!(cache.replay(&first).await, 20);
        assert_eq!(cache.replay(&second).await, 20);
        assert_eq!(first.drain(), second.drain());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let cache = HevcCache::new(true);
        cache.ingest(nal(NAL_VPS, 10, 1)).await;
        cache.ingest(nal(NAL_SPS, 10, 2)).await;
        cache.ingest(nal(NAL_PPS, 10, 3)).await;
        cache.ingest(nal(IDR_W_RADL, 10, 4)).await;
        cache.ingest(nal(TRAIL_R, 10, 5)).await;

        cache.reset().await;
        let queue = SyncQueue::new();
        assert_eq!(cache.replay(&queue).await, 0);
        assert!(queue.is_empty());

        // Again, from an already empty cache
        cache.reset().await;
        assert_eq!(cache.replay(&queue).await, 0);
        assert!(queue.is_empty());

        // GOP must restart from a keyframe after reset
        cache.ingest(nal(TRAIL_R, 10, 6)).await;
        assert_eq!(cache.stats().await.gop_packet_count, 0);
    }

    #[tokio::test]
    async fn test_disabled_gop_cache() {
        let cache = HevcCache::new(false);
        assert!(!cache.cache_gop());

        cache.ingest(nal(NAL_VPS, 10, 1)).await;
        assert!(cache.ingest(nal(IDR_W_RADL, 100, 2)).await);
        assert!(!cache.ingest(nal(TRAIL_R, 100, 3)).await);

        let queue = SyncQueue::new();
        assert_eq!(cache.replay(&queue).await, 10);
        assert_eq!(tags(&queue.drain()), vec![1]);
        assert_eq!(cache.stats().await.gop_packet_count, 0);
    }

    #[tokio::test]
    async fn test_short_payload_is_inert() {
        let cache = HevcCache::new(true);
        let packet = RtpPacket::from_payload(Channel::Video, Bytes::from_static(&[0x26, 0x01]));
        assert!(!cache.ingest(packet).await);
        assert_eq!(cache.stats().await.gop_packet_count, 0);
    }

    #[tokio::test]
    async fn test_is_ready() {
        let cache = HevcCache::new(true);
        assert!(!cache.is_ready().await);

        cache.ingest(nal(NAL_VPS, 10, 1)).await;
        cache.ingest(nal(NAL_SPS, 10, 2)).await;
        cache.ingest(nal(NAL_PPS, 10, 3)).await;
        assert!(!cache.is_ready().await);

        cache.ingest(nal(IDR_W_RADL, 10, 4)).await;
        assert!(cache.is_ready().await);

        let no_gop = HevcCache::with_config(CacheConfig::default().disable_gop_cache());
        no_gop.ingest(nal(NAL_VPS, 10, 1)).await;
        no_gop.ingest(nal(NAL_SPS, 10, 2)).await;
        no_gop.ingest(nal(NAL_PPS, 10, 3)).await;
        assert!(no_gop.is_ready().await);
    }

    #[tokio::test]
    async fn test_replay_through_trait_object() {
        let cache = HevcCache::default();
        cache.ingest(nal(NAL_PPS, 10, 1)).await;

        let queue = SyncQueue::new();
        let sink: &dyn PacketSink = &queue;
        assert_eq!(cache.replay(sink).await, 10);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replay_sees_whole_gops() {
        let cache = Arc::new(HevcCache::new(true));
        cache.ingest(nal(NAL_VPS, 10, 0)).await;
        cache.ingest(nal(NAL_SPS, 10, 0)).await;
        cache.ingest(nal(NAL_PPS, 10, 0)).await;

        let writer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..2000u32 {
                    let packet = if i % 30 == 0 {
                        nal(IDR_W_RADL, 16, 1)
                    } else {
                        nal(TRAIL_R, 16, 2)
                    };
                    cache.ingest(packet).await;
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let queue = SyncQueue::new();
                        let bytes = cache.replay(&queue).await;
                        let packets = queue.drain();

                        assert!(packets.len() >= 3);
                        assert_eq!(bytes, packets.iter().map(RtpPacket::size).sum::<usize>());
                        if let Some(first) = packets.get(3) {
                            assert_eq!(tag(first), 1, "GOP must open with a keyframe");
                        }
                        assert!(packets.len() - 3 <= 30);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
