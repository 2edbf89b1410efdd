//! Spatial Chunk Cache
//!
//! Tracks which grid chunks are resident for the current project, which
//! node ids each chunk contributed, and in which order chunks were used.
//! Loads are stamped with a generation so that a fetch superseded by a
//! newer viewport update, or one whose chunk was evicted while in flight,
//! is discarded instead of being merged back.
//!
//! Thread-safe via interior mutability using parking_lot::Mutex.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;

use crate::model::Position;
use crate::spatial::{ChunkKey, WorldBounds};

/// Distance from the viewport center beyond which chunks are dropped
pub const DEFAULT_EVICTION_DISTANCE: f64 = 3000.0;

/// Maximum number of resident chunks
pub const DEFAULT_MAX_CHUNKS: usize = 12;

/// Load state of a resident chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Fetch issued, result not yet merged
    Loading,
    /// Nodes merged into the working set
    Loaded,
}

/// A resident chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEntry {
    pub key: ChunkKey,
    /// Bounds the chunk was queried with
    pub bounds: WorldBounds,
    /// Ids of the nodes this chunk contributed
    pub node_ids: Vec<String>,
    pub state: ChunkState,
    /// Generation of the most recent load request for this chunk
    pub generation: u64,
}

/// What the caller should do for a requested chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDecision {
    /// Chunk already loaded; no fetch needed
    CacheHit,
    /// Chunk marked loading; caller must fetch and report back
    Fetch,
}

/// Result of reporting a finished fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Chunk is now loaded with the reported nodes
    Merged,
    /// A newer load of the same chunk superseded this one
    Stale,
    /// Chunk was evicted (or the cache cleared) while the fetch was in flight
    Evicted,
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Number of cache hits (chunk already loaded)
    pub hits: u64,
    /// Number of cache misses (chunk needed loading)
    pub misses: u64,
    /// Number of chunks evicted
    pub evictions: u64,
    /// Fetch results discarded as stale or evicted
    pub stale_discards: u64,
}

impl CacheMetrics {
    /// Get hit rate as a percentage (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Inner state for ChunkCache (protected by Mutex)
struct CacheState {
    /// Resident chunks; most recently used at the front
    chunks: LruCache<ChunkKey, ChunkEntry>,
    metrics: CacheMetrics,
}

/// Cache of resident spatial chunks with distance-based eviction.
///
/// All methods take `&self`.
pub struct ChunkCache {
    state: Mutex<CacheState>,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                // Capacity is enforced by `evict_for`, not by the LRU itself
                chunks: LruCache::unbounded(),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Number of resident chunks (loading or loaded)
    pub fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks in the `Loaded` state
    pub fn loaded_count(&self) -> usize {
        self.state
            .lock()
            .chunks
            .iter()
            .filter(|(_, entry)| entry.state == ChunkState::Loaded)
            .count()
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.state.lock().chunks.contains(key)
    }

    /// Current state of a chunk, without touching the LRU order
    pub fn state_of(&self, key: &ChunkKey) -> Option<ChunkState> {
        self.state.lock().chunks.peek(key).map(|entry| entry.state)
    }

    /// Copy of a resident chunk entry
    pub fn entry(&self, key: &ChunkKey) -> Option<ChunkEntry> {
        self.state.lock().chunks.peek(key).cloned()
    }

    /// Resident chunk keys, most recently used first
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.state.lock().chunks.iter().map(|(key, _)| *key).collect()
    }

    /// Get a snapshot of cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }

    /// Decide whether `key` must be fetched for a request of `generation`.
    ///
    /// A loaded chunk is a hit. A chunk that is absent, or still loading from
    /// an older request, is (re)marked `Loading` with the new generation.
    pub fn begin_load(&self, key: ChunkKey, bounds: WorldBounds, generation: u64) -> LoadDecision {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(entry) = state.chunks.get_mut(&key) {
            if entry.state == ChunkState::Loaded {
                state.metrics.hits += 1;
                return LoadDecision::CacheHit;
            }
            entry.generation = entry.generation.max(generation);
            entry.bounds = bounds;
            state.metrics.misses += 1;
            return LoadDecision::Fetch;
        }

        state.chunks.put(
            key,
            ChunkEntry {
                key,
                bounds,
                node_ids: Vec::new(),
                state: ChunkState::Loading,
                generation,
            },
        );
        state.metrics.misses += 1;
        LoadDecision::Fetch
    }

    /// Report a finished fetch for `key`.
    ///
    /// Evicted chunks are never re-inserted, and a result older than the
    /// chunk's recorded generation is dropped.
    pub fn complete_load(&self, key: ChunkKey, generation: u64, node_ids: Vec<String>) -> MergeOutcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let outcome = match state.chunks.get_mut(&key) {
            None => MergeOutcome::Evicted,
            Some(entry) if generation < entry.generation => MergeOutcome::Stale,
            Some(entry) => {
                let mut seen = HashSet::new();
                entry.node_ids = node_ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
                entry.state = ChunkState::Loaded;
                entry.generation = generation;
                MergeOutcome::Merged
            }
        };

        if outcome != MergeOutcome::Merged {
            state.metrics.stale_discards += 1;
        }
        outcome
    }

    /// Report a failed fetch; a chunk still loading for this request is dropped.
    ///
    /// Loaded chunks are left untouched.
    pub fn fail_load(&self, key: ChunkKey, generation: u64) {
        let mut state = self.state.lock();
        let drop_entry = matches!(
            state.chunks.peek(&key),
            Some(entry) if entry.state == ChunkState::Loading && entry.generation == generation
        );
        if drop_entry {
            state.chunks.pop(&key);
        }
    }

    /// Evict chunks farther than `max_distance` from `center`, then the
    /// farthest remaining ones until at most `max_chunks` are resident.
    ///
    /// Returns the evicted keys.
    pub fn evict_for(&self, center: Position, max_distance: f64, max_chunks: usize) -> Vec<ChunkKey> {
        let mut state = self.state.lock();

        let mut by_distance: Vec<(ChunkKey, f64)> = state
            .chunks
            .iter()
            .map(|(key, entry)| (*key, entry.bounds.distance_to(center)))
            .collect();
        by_distance.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut remaining = by_distance.len();
        let mut evicted = Vec::new();
        for (key, distance) in by_distance {
            if distance > max_distance || remaining > max_chunks {
                state.chunks.pop(&key);
                evicted.push(key);
                remaining -= 1;
            }
        }

        state.metrics.evictions += evicted.len() as u64;
        evicted
    }

    /// Union of node ids over loaded chunks, de-duplicated, most recently
    /// used chunk first
    pub fn resident_node_ids(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for (_, entry) in state.chunks.iter() {
            if entry.state != ChunkState::Loaded {
                continue;
            }
            for id in &entry.node_ids {
                if seen.insert(id.as_str()) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Drop all chunks. In-flight loads will report `Evicted`.
    pub fn clear(&self) {
        self.state.lock().chunks.clear();
    }

    /// Reset cache metrics
    pub fn reset_metrics(&self) {
        self.state.lock().metrics = CacheMetrics::default();
    }
}
