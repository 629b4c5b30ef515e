use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::stats::CacheStats;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// Lifetime given to pinned segments; the decay pass skips them
pub const PINNED_LIFETIME: u32 = u32::MAX;

pub struct CacheEntry {
    pub segment: Arc<dyn Any + Send + Sync>,
    pub kind: SegmentKind,
    pub lifetime: u32,
}

/// Decoded segments keyed by address, with a decaying lifetime counter
pub struct ReadCache {
    entries: HashMap<Address, CacheEntry>,
    lifetime: u32,
    hit_count: u64,
    miss_count: u64,
    evicted_count: u64,
}

impl ReadCache {
    pub fn new(lifetime: u32) -> Self {
        ReadCache {
            entries: HashMap::new(),
            lifetime: lifetime.max(1),
            hit_count: 0,
            miss_count: 0,
            evicted_count: 0,
        }
    }

    fn lifetime_for(&self, kind: SegmentKind) -> u32 {
        if kind.is_pinned() { PINNED_LIFETIME } else { self.lifetime }
    }

    /// Returns a copy of the cached segment and refreshes its lifetime
    pub fn get<T: Segment>(&mut self, address: Address) -> Option<Result<T>> {
        let refreshed = self.lifetime;
        if !self.entries.contains_key(&address) {
            self.miss_count += 1;
            return None;
        }

        self.hit_count += 1;
        let entry = self.entries.get_mut(&address)?;
        if entry.lifetime != PINNED_LIFETIME {
            entry.lifetime = refreshed;
        }

        match entry.segment.downcast_ref::<T>() {
            Some(segment) => Some(Ok(segment.clone())),
            None => Some(Err(Error::internal(format!(
                "Segment at {} is {:?}, not {:?}",
                address, entry.kind, T::KIND
            )))),
        }
    }

    pub fn insert<T: Segment>(&mut self, segment: &T) {
        let entry = CacheEntry {
            segment: Arc::new(segment.clone()),
            kind: T::KIND,
            lifetime: self.lifetime_for(T::KIND),
        };
        self.entries.insert(segment.address(), entry);
    }

    pub fn remove(&mut self, address: Address) -> bool {
        self.entries.remove(&address).is_some()
    }

    /// Decrements every unpinned lifetime and evicts those reaching zero
    pub fn decay(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            if entry.lifetime == PINNED_LIFETIME {
                return true;
            }
            entry.lifetime = entry.lifetime.saturating_sub(1);
            entry.lifetime > 0
        });
        let evicted = before - self.entries.len();
        self.evicted_count += evicted as u64;
        evicted
    }

    pub fn contains(&self, address: Address) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pinned_len(&self) -> usize {
        self.entries.values().filter(|e| e.lifetime == PINNED_LIFETIME).count()
    }
}

/// Latest encoded bytes of every dirty segment, last write wins
pub struct WriteCache {
    dirty: HashMap<Address, Vec<u8>>,
    flushed_count: u64,
}

impl WriteCache {
    pub fn new() -> Self {
        WriteCache {
            dirty: HashMap::new(),
            flushed_count: 0,
        }
    }

    pub fn put(&mut self, address: Address, bytes: Vec<u8>) {
        self.dirty.insert(address, bytes);
    }

    pub fn get(&self, address: Address) -> Option<&Vec<u8>> {
        self.dirty.get(&address)
    }

    /// Copies of all dirty segments, ordered by address for sequential writes.
    /// Entries stay dirty until `settle` confirms them.
    pub fn snapshot(&self) -> Vec<(Address, Vec<u8>)> {
        let mut pending: Vec<_> = self
            .dirty
            .iter()
            .map(|(address, bytes)| (*address, bytes.clone()))
            .collect();
        pending.sort_by_key(|(address, _)| *address);
        pending
    }

    /// Forgets the flushed segments that were not rewritten in the meantime
    pub fn settle(&mut self, flushed: &[(Address, Vec<u8>)]) -> usize {
        let mut settled = 0;
        for (address, bytes) in flushed {
            if self.dirty.get(address) == Some(bytes) {
                self.dirty.remove(address);
                settled += 1;
            }
        }
        self.flushed_count += settled as u64;
        settled
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    pub fn len(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }
}

/// Both cache sides, guarded together by one mutex per file
pub struct BufferCache {
    pub read: ReadCache,
    pub write: WriteCache,
}

impl BufferCache {
    pub fn new(lifetime: u32) -> Self {
        BufferCache {
            read: ReadCache::new(lifetime),
            write: WriteCache::new(),
        }
    }

    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_segments: self.read.len(),
            pinned_segments: self.read.pinned_len(),
            dirty_segments: self.write.len(),
            hit_count: self.read.hit_count,
            miss_count: self.read.miss_count,
            evicted_count: self.read.evicted_count,
            flushed_count: self.write.flushed_count,
        }
    }
}
