use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::StorageStats;
use crate::storage::cache::BufferCache;
use crate::storage::file_lock::FileLock;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// State shared between a storage file and its maintenance thread
struct Shared {
    path: PathBuf,
    cache: Mutex<BufferCache>,  // Read + write caches
    io: Mutex<File>,            // OS handle; always locked after `cache`
    io_buffer_size: usize,
    failure: Mutex<Option<Error>>,  // Last maintenance error, reported by the next flush
}

impl Shared {
    /// Decay the read cache, then write every dirty segment to disk
    fn maintain(&self) -> Result<()> {
        let evicted = self.cache.lock().read.decay();
        if evicted > 0 {
            debug!(path = %self.path.display(), evicted, "Evicted cached segments");
        }
        self.flush()?;
        Ok(())
    }

    /// Writes every dirty segment; they stay dirty until the disk write succeeds
    fn flush(&self) -> Result<usize> {
        let cache = self.cache.lock();
        if cache.write.is_empty() {
            return Ok(0);
        }
        let pending = cache.write.snapshot();

        // Concurrent flushes reach the disk in snapshot order
        let mut file = self.io.lock();
        drop(cache);

        let written = self.write_pending(&mut file, &pending);
        drop(file);
        written?;

        let settled = self.cache.lock().write.settle(&pending);
        debug!(path = %self.path.display(), segments = pending.len(), settled, "Flushed write cache");
        Ok(pending.len())
    }

    fn write_pending(&self, file: &mut File, pending: &[(Address, Vec<u8>)]) -> Result<()> {
        let mut writer = BufWriter::with_capacity(self.io_buffer_size, file);
        let mut cursor: Option<u64> = None;
        for (address, bytes) in pending {
            if cursor != Some(address.0) {
                writer.seek(SeekFrom::Start(address.0))?;
            }
            writer.write_all(bytes)?;
            cursor = Some(address.0 + bytes.len() as u64);
        }
        writer.flush()?;
        Ok(())
    }

    fn take_failure(&self) -> Option<Error> {
        self.failure.lock().take()
    }

    fn read_from_disk<T: Segment>(&self, file: &mut File, address: Address) -> Result<T> {
        file.seek(SeekFrom::Start(address.0))?;
        match T::KIND.fixed_size() {
            Some(size) => {
                let mut bytes = vec![0u8; size as usize];
                file.read_exact(&mut bytes)?;
                T::decode(address, &mut Cursor::new(bytes))
            }
            None => {
                let mut reader = BufReader::with_capacity(self.io_buffer_size, file);
                T::decode(address, &mut reader)
            }
        }
    }
}

struct Maintenance {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// One flat index file: bump allocation plus cached segment I/O
pub struct StorageFile {
    shared: Arc<Shared>,
    next_free: Mutex<u64>,
    maintenance: Mutex<Option<Maintenance>>,
    lock: Mutex<Option<FileLock>>,
    closed: AtomicBool,
    created: bool,
    opened_at: DateTime<Utc>,
}

impl StorageFile {
    pub fn open<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let lock = FileLock::acquire(&file, &path)?;
        let created = file.metadata()?.len() == 0;

        let shared = Arc::new(Shared {
            path: path.clone(),
            cache: Mutex::new(BufferCache::new(config.cache_lifetime)),
            io: Mutex::new(file),
            io_buffer_size: config.io_buffer_size.max(512),
            failure: Mutex::new(None),
        });
        let maintenance = Self::spawn_maintenance(shared.clone(), config.maintenance_interval)?;

        info!(path = %path.display(), created, "Opened storage file");

        Ok(StorageFile {
            shared,
            next_free: Mutex::new(0),
            maintenance: Mutex::new(Some(maintenance)),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
            created,
            opened_at: Utc::now(),
        })
    }

    fn spawn_maintenance(shared: Arc<Shared>, interval: Duration) -> Result<Maintenance> {
        let (shutdown, stop) = bounded::<()>(1);
        let ticker = tick(interval.max(Duration::from_millis(1)));

        let handle = thread::Builder::new()
            .name("segstore-maintenance".to_string())
            .spawn(move || loop {
                select! {
                    recv(stop) -> _ => break,
                    recv(ticker) -> _ => {
                        if let Err(e) = shared.maintain() {
                            warn!(path = %shared.path.display(), error = %e, "Background flush failed");
                            *shared.failure.lock() = Some(e);
                        }
                    }
                }
            })?;

        Ok(Maintenance { shutdown, handle })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Whether the file was empty when opened
    pub fn is_new(&self) -> bool {
        self.created
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::invalid_state(format!(
                "Storage file {} is closed",
                self.shared.path.display()
            )));
        }
        Ok(())
    }

    /// Bump allocation; space is never reused at this level
    pub fn alloc(&self, size: u64) -> Result<Address> {
        self.ensure_open()?;
        let mut next_free = self.next_free.lock();
        let address = Address(*next_free);
        *next_free += size;
        Ok(address)
    }

    pub fn next_free(&self) -> u64 {
        *self.next_free.lock()
    }

    /// Restores the bump pointer read back from a persisted allocator state
    pub fn set_next_free(&self, next_free: u64) {
        *self.next_free.lock() = next_free;
    }

    pub fn read<T: Segment>(&self, address: Address) -> Result<T> {
        self.ensure_open()?;
        if address.is_none() && T::KIND != SegmentKind::Header {
            return Err(Error::internal(format!("Read of {:?} at the null address", T::KIND)));
        }

        let mut cache = self.shared.cache.lock();
        if let Some(hit) = cache.read.get::<T>(address) {
            return hit;
        }

        // Read-your-writes: dirty bytes take precedence over the disk copy
        let dirty = match cache.write.get(address) {
            Some(bytes) => Some(T::decode(address, &mut Cursor::new(bytes.as_slice()))?),
            None => None,
        };
        if let Some(segment) = dirty {
            cache.read.insert(&segment);
            return Ok(segment);
        }

        let mut file = self.shared.io.lock();
        drop(cache);
        let segment = self.shared.read_from_disk::<T>(&mut file, address)?;
        drop(file);

        self.settle_read(segment)
    }

    /// Caches a segment read from disk unless a write landed on its address
    /// while the disk was read; the newer version is returned then.
    fn settle_read<T: Segment>(&self, segment: T) -> Result<T> {
        let address = segment.address();
        let mut cache = self.shared.cache.lock();
        if let Some(bytes) = cache.write.get(address) {
            let dirty = T::decode(address, &mut Cursor::new(bytes.as_slice()))?;
            cache.read.insert(&dirty);
            return Ok(dirty);
        }
        if let Some(cached) = cache.read.get::<T>(address) {
            return cached;
        }
        cache.read.insert(&segment);
        Ok(segment)
    }

    /// Marks the segment dirty; the disk write happens on the next flush
    pub fn write<T: Segment>(&self, segment: &T) -> Result<()> {
        self.ensure_open()?;
        let address = segment.address();
        if address.is_none() && T::KIND != SegmentKind::Header {
            return Err(Error::internal(format!("Write of {:?} at the null address", T::KIND)));
        }

        let mut bytes = Vec::with_capacity(T::KIND.fixed_size().unwrap_or(64) as usize);
        segment.encode(&mut bytes);

        let mut cache = self.shared.cache.lock();
        cache.write.put(address, bytes);
        cache.read.insert(segment);
        Ok(())
    }

    /// Drops a segment from the read cache
    pub fn invalidate(&self, address: Address) {
        self.shared.cache.lock().read.remove(address);
    }

    /// Writes dirty segments to disk. Also fails with the last error of the
    /// maintenance thread, if any occurred since the previous call.
    pub fn flush(&self) -> Result<()> {
        let failure = self.shared.take_failure();
        self.shared.flush()?;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One decay + flush pass, the same work the maintenance thread does per tick
    pub fn maintain(&self) -> Result<()> {
        self.shared.maintain()
    }

    /// Logical wipe: forget every cached segment and restart allocation at zero
    pub fn reset(&self) {
        let mut next_free = self.next_free.lock();
        self.shared.cache.lock().clear();
        *next_free = 0;
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let cache = self.shared.cache.lock().stats();
        let file_len = self.shared.io.lock().metadata()?.len();

        Ok(StorageStats {
            opened_at: self.opened_at,
            next_free: self.next_free(),
            file_len,
            cache,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the maintenance thread, flushes, syncs and releases the file lock
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(maintenance) = self.maintenance.lock().take() {
            let _ = maintenance.shutdown.send(());
            if maintenance.handle.join().is_err() {
                warn!(path = %self.shared.path.display(), "Maintenance thread panicked");
            }
        }

        let failure = self.shared.take_failure();
        let flushed = self.shared.flush().and_then(|_| {
            self.shared.io.lock().sync_all()?;
            Ok(())
        });
        self.lock.lock().take();
        flushed?;
        if let Some(e) = failure {
            return Err(e);
        }

        info!(path = %self.shared.path.display(), "Closed storage file");
        Ok(())
    }
}

impl Drop for StorageFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.shared.path.display(), error = %e, "Closing storage file failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::storage::allocator::FreeNode;
    use crate::storage::header::HeaderSegment;
    use tempfile::TempDir;

    fn test_config() -> Config {
        Config {
            cache_lifetime: 2,
            maintenance_interval: Duration::from_secs(3600),
            ..Config::default()
        }
    }

    #[test]
    fn test_alloc_bumps_by_size() {
        let dir = TempDir::new().unwrap();
        let file = StorageFile::open(dir.path().join("a.wds"), &test_config()).unwrap();

        assert_eq!(file.alloc(4).unwrap(), Address(0));
        assert_eq!(file.alloc(8).unwrap(), Address(4));
        assert_eq!(file.next_free(), 12);
    }

    #[test]
    fn test_read_your_writes_before_flush() {
        let dir = TempDir::new().unwrap();
        let file = StorageFile::open(dir.path().join("a.wds"), &test_config()).unwrap();
        file.alloc(8).unwrap();
        let address = file.alloc(8).unwrap();

        file.write(&FreeNode { address, next: Address(99) }).unwrap();
        file.invalidate(address);

        let node: FreeNode = file.read(address).unwrap();
        assert_eq!(node.next, Address(99));
        assert_eq!(file.stats().unwrap().file_len, 0);
    }

    #[test]
    fn test_evicted_segment_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let file = StorageFile::open(dir.path().join("a.wds"), &test_config()).unwrap();
        file.alloc(8).unwrap();
        let address = file.alloc(8).unwrap();

        file.write(&FreeNode { address, next: Address(7) }).unwrap();
        file.maintain().unwrap();
        file.maintain().unwrap();

        let stats = file.stats().unwrap();
        assert_eq!(stats.cache.cached_segments, 0);
        assert_eq!(stats.cache.dirty_segments, 0);

        let node: FreeNode = file.read(address).unwrap();
        assert_eq!(node.next, Address(7));
    }

    #[test]
    fn test_close_persists_and_reopen_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.wrt");
        {
            let file = StorageFile::open(&path, &test_config()).unwrap();
            let address = file.alloc(HeaderSegment::SIZE).unwrap();
            file.write(&HeaderSegment::new(address, *b"WRT")).unwrap();
            file.close().unwrap();
            assert!(file.write(&HeaderSegment::new(address, *b"WRT")).is_err());
        }

        let file = StorageFile::open(&path, &test_config()).unwrap();
        assert!(!file.is_new());
        let header: HeaderSegment = file.read(Address(0)).unwrap();
        assert_eq!(&header.tag, b"WRT");
    }

    #[test]
    fn test_second_open_is_rejected_while_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.wds");
        let first = StorageFile::open(&path, &test_config()).unwrap();

        assert!(StorageFile::open(&path, &test_config()).is_err());
        first.close().unwrap();
        assert!(StorageFile::open(&path, &test_config()).is_ok());
    }

    #[test]
    fn test_disk_copy_yields_to_newer_write() {
        let dir = TempDir::new().unwrap();
        let file = StorageFile::open(dir.path().join("a.wds"), &test_config()).unwrap();
        file.alloc(8).unwrap();
        let address = file.alloc(8).unwrap();
        file.write(&FreeNode { address, next: Address(1) }).unwrap();
        file.flush().unwrap();

        // Old bytes came off the disk, then a write replaced them and its
        // cached copy was evicted before the reader cached its result
        let stale = FreeNode { address, next: Address(1) };
        file.write(&FreeNode { address, next: Address(2) }).unwrap();
        file.invalidate(address);

        assert_eq!(file.settle_read(stale).unwrap().next, Address(2));
        let cached: FreeNode = file.read(address).unwrap();
        assert_eq!(cached.next, Address(2));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_flush_keeps_segments_dirty() {
        // Every write to this device fails with ENOSPC
        if !Path::new("/dev/full").exists() {
            return;
        }
        let config = Config {
            cache_lifetime: 1,
            maintenance_interval: Duration::from_millis(5),
            ..Config::default()
        };
        let file = StorageFile::open("/dev/full", &config).unwrap();
        file.write(&FreeNode { address: Address(8), next: Address(99) }).unwrap();

        // Background ticks evict the cached copy and fail to flush
        thread::sleep(Duration::from_millis(100));
        let stats = file.stats().unwrap();
        assert_eq!(stats.cache.dirty_segments, 1);
        assert_eq!(stats.cache.flushed_count, 0);

        let node: FreeNode = file.read(Address(8)).unwrap();
        assert_eq!(node.next, Address(99));

        let err = file.flush().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(file.maintain().is_err());
        assert_eq!(file.stats().unwrap().cache.dirty_segments, 1);
        assert!(file.close().is_err());
    }

    #[test]
    fn test_null_address_read_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = StorageFile::open(dir.path().join("a.wds"), &test_config()).unwrap();
        assert!(file.read::<FreeNode>(Address::NONE).is_err());
    }
}
