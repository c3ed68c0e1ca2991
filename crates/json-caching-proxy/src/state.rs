//! Runtime proxy flags and the record/playback decision engine.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-lifetime behavioral flags, each mutable at runtime through the
/// admin API. Flags are read fresh for every request, so a toggle takes
/// effect starting with the next request after the toggle call returns.
#[derive(Debug)]
pub struct ProxyState {
    playback: AtomicBool,
    recording: AtomicBool,
    cache_everything: AtomicBool,
}

impl ProxyState {
    pub fn new(playback: bool, recording: bool, cache_everything: bool) -> Self {
        Self {
            playback: AtomicBool::new(playback),
            recording: AtomicBool::new(recording),
            cache_everything: AtomicBool::new(cache_everything),
        }
    }

    pub fn playback(&self) -> bool {
        self.playback.load(Ordering::SeqCst)
    }

    pub fn set_playback(&self, enabled: bool) {
        self.playback.store(enabled, Ordering::SeqCst);
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, enabled: bool) {
        self.recording.store(enabled, Ordering::SeqCst);
    }

    pub fn cache_everything(&self) -> bool {
        self.cache_everything.load(Ordering::SeqCst)
    }

    pub fn set_cache_everything(&self, enabled: bool) {
        self.cache_everything.store(enabled, Ordering::SeqCst);
    }
}

/// What to do with a request once the cache has been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Serve the stored entry without contacting upstream.
    ServeCached,
    /// Forward upstream and store the response if it is eligible.
    ForwardAndRecord,
    /// Forward upstream without reading or writing the cache.
    ForwardOnly,
}

/// Decision table for the playback/recording flags against a cache
/// lookup result.
pub fn decide(playback: bool, recording: bool, cache_hit: bool) -> Decision {
    if playback && cache_hit {
        return Decision::ServeCached;
    }
    if recording {
        Decision::ForwardAndRecord
    } else {
        Decision::ForwardOnly
    }
}

/// Whether a fresh upstream response is eligible for storage: everything
/// when `cache_everything` is set, otherwise JSON content only.
pub fn storable(cache_everything: bool, content_type: Option<&str>) -> bool {
    if cache_everything {
        return true;
    }
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}
