//! Cache configuration

/// Per-stream cache options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Buffer the latest GOP for late joiners
    ///
    /// Parameter sets are cached either way.
    pub gop_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { gop_enabled: true }
    }
}

impl CacheConfig {
    /// Enable or disable GOP buffering
    pub fn gop_enabled(mut self, enabled: bool) -> Self {
        self.gop_enabled = enabled;
        self
    }

    /// Disable GOP buffering
    pub fn disable_gop_cache(mut self) -> Self {
        self.gop_enabled = false;
        self
    }
}

impl From<bool> for CacheConfig {
    fn from(gop_enabled: bool) -> Self {
        Self { gop_enabled }
    }
}
