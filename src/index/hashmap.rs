use std::fmt;
use std::io::Read;
use std::marker::PhantomData;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::storage::allocator::Allocator;
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// A segment that can be chained in a hash bucket
pub trait HashItem: Segment {
    type Key: Ord + Copy + fmt::Debug;

    fn key(&self) -> Self::Key;

    fn next(&self) -> Address;

    fn set_next(&mut self, next: Address);

    /// Must be identical across runs, it selects on-disk buckets
    fn bucket_hash(key: &Self::Key) -> u64;
}

/// Bucket count followed by one chain head per bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketArray {
    pub address: Address,
    pub heads: Vec<Address>,
}

impl BucketArray {
    pub fn encoded_size(bucket_count: u32) -> u64 {
        4 + 8 * bucket_count as u64
    }

    fn head_address(base: Address, bucket: u32) -> Address {
        base.offset(4 + 8 * bucket as u64)
    }
}

impl Segment for BucketArray {
    const KIND: SegmentKind = SegmentKind::BucketArray;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_u32(buf, self.heads.len() as u32);
        for head in &self.heads {
            Codec::put_address(buf, *head);
        }
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        let count = Codec::get_u32(reader)?;
        let mut heads = Vec::with_capacity(count as usize);
        for _ in 0..count {
            heads.push(Codec::get_address(reader)?);
        }
        Ok(BucketArray { address, heads })
    }
}

/// One slot of the bucket array, rewritten on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHead {
    pub address: Address,
    pub head: Address,
}

impl Segment for BucketHead {
    const KIND: SegmentKind = SegmentKind::BucketHead;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_address(buf, self.head);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(BucketHead {
            address,
            head: Codec::get_address(reader)?,
        })
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Smallest prime not below the requested capacity
pub fn bucket_count_for(capacity: usize) -> Result<u32> {
    let mut candidate = (capacity as u64).max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    u32::try_from(candidate)
        .map_err(|_| Error::invalid_argument(format!("Hash map capacity {} is too large", capacity)))
}

pub enum AddOutcome<I> {
    Inserted(I),
    Existing(I),
}

impl<I> AddOutcome<I> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, AddOutcome::Inserted(_))
    }

    pub fn into_item(self) -> I {
        match self {
            AddOutcome::Inserted(item) | AddOutcome::Existing(item) => item,
        }
    }
}

/// Externally chained hash map whose chains are kept sorted by key
pub struct SegmentHashMap<I: HashItem> {
    file: Arc<StorageFile>,
    allocator: Arc<Allocator>,
    base: Address,
    bucket_count: u32,
    lock: RwLock<()>,
    _marker: PhantomData<fn() -> I>,
}

impl<I: HashItem> SegmentHashMap<I> {
    /// Writes an empty bucket array at `base`, which must span `encoded_size(bucket_count)`
    pub fn create(
        file: Arc<StorageFile>,
        allocator: Arc<Allocator>,
        base: Address,
        bucket_count: u32,
    ) -> Result<Self> {
        let map = SegmentHashMap {
            file,
            allocator,
            base,
            bucket_count,
            lock: RwLock::new(()),
            _marker: PhantomData,
        };
        map.write_empty_buckets()?;
        Ok(map)
    }

    pub fn open(file: Arc<StorageFile>, allocator: Arc<Allocator>, base: Address) -> Result<Self> {
        let array: BucketArray = file.read(base)?;
        if array.heads.is_empty() {
            return Err(Error::invalid_state(format!("Bucket array at {} has no buckets", base)));
        }

        Ok(SegmentHashMap {
            bucket_count: array.heads.len() as u32,
            file,
            allocator,
            base,
            lock: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Empties every bucket; chain segments are left unreachable
    pub fn reinitialize(&self) -> Result<()> {
        let _guard = self.lock.write();
        for bucket in 0..self.bucket_count {
            self.write_head(bucket, Address::NONE)?;
        }
        Ok(())
    }

    // Bucket heads are later read back as 8-byte slots of this region, so the
    // whole array has to reach the disk before the first slot read.
    fn write_empty_buckets(&self) -> Result<()> {
        self.file.write(&BucketArray {
            address: self.base,
            heads: vec![Address::NONE; self.bucket_count as usize],
        })?;
        self.file.flush()
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    fn bucket_of(&self, key: &I::Key) -> u32 {
        (I::bucket_hash(key) % self.bucket_count as u64) as u32
    }

    fn read_head(&self, bucket: u32) -> Result<Address> {
        let slot: BucketHead = self.file.read(BucketArray::head_address(self.base, bucket))?;
        Ok(slot.head)
    }

    fn write_head(&self, bucket: u32, head: Address) -> Result<()> {
        self.file.write(&BucketHead {
            address: BucketArray::head_address(self.base, bucket),
            head,
        })
    }

    /// Walks the chain up to `key`: (predecessor, item with an equal or greater key)
    fn locate(&self, bucket: u32, key: &I::Key) -> Result<(Option<I>, Option<I>)> {
        let mut previous: Option<I> = None;
        let mut current = self.read_head(bucket)?;

        while current.is_some() {
            let item: I = self.file.read(current)?;
            if item.key() >= *key {
                return Ok((previous, Some(item)));
            }
            current = item.next();
            previous = Some(item);
        }
        Ok((previous, None))
    }

    /// Inserts the item produced by `build` unless `key` is already present,
    /// in which case the stored item is returned and `build` is never called.
    pub fn add_with<F>(&self, key: I::Key, build: F) -> Result<AddOutcome<I>>
    where
        F: FnOnce(Address) -> Result<I>,
    {
        let _guard = self.lock.write();
        let bucket = self.bucket_of(&key);
        let (previous, found) = self.locate(bucket, &key)?;

        if let Some(item) = &found {
            if item.key() == key {
                return Ok(AddOutcome::Existing(item.clone()));
            }
        }

        let address = self.allocator.alloc(I::KIND)?;
        let mut item = build(address)?;
        if item.key() != key || item.address() != address {
            return Err(Error::internal(format!(
                "Built item {:?} at {} does not match key {:?} at {}",
                item.key(),
                item.address(),
                key,
                address
            )));
        }

        item.set_next(found.map(|successor| successor.address()).unwrap_or(Address::NONE));
        self.file.write(&item)?;

        match previous {
            Some(mut previous) => {
                previous.set_next(address);
                self.file.write(&previous)?;
            }
            None => self.write_head(bucket, address)?,
        }
        Ok(AddOutcome::Inserted(item))
    }

    pub fn get(&self, key: I::Key) -> Result<Option<I>> {
        self.with_item(key, |item| Ok(item.clone()))
    }

    /// Runs `read` on the item under `key` while the map stays read-locked, so
    /// segments the item owns cannot be freed by a concurrent remove meanwhile
    pub fn with_item<R, F>(&self, key: I::Key, read: F) -> Result<Option<R>>
    where
        F: FnOnce(&I) -> Result<R>,
    {
        let _guard = self.lock.read();
        let (_, found) = self.locate(self.bucket_of(&key), &key)?;
        match found {
            Some(item) if item.key() == key => Ok(Some(read(&item)?)),
            _ => Ok(None),
        }
    }

    /// Unlinks and frees the item stored under `key`, returning its last state
    pub fn remove(&self, key: I::Key) -> Result<Option<I>> {
        let _guard = self.lock.write();
        let bucket = self.bucket_of(&key);
        let (previous, found) = self.locate(bucket, &key)?;

        let item = match found {
            Some(item) if item.key() == key => item,
            _ => return Ok(None),
        };

        match previous {
            Some(mut previous) => {
                previous.set_next(item.next());
                self.file.write(&previous)?;
            }
            None => self.write_head(bucket, item.next())?,
        }
        self.allocator.free(&item)?;
        Ok(Some(item))
    }

    /// Keys of one bucket in chain order
    pub fn bucket_keys(&self, bucket: u32) -> Result<Vec<I::Key>> {
        let _guard = self.lock.read();
        let mut keys = Vec::new();
        let mut current = self.read_head(bucket)?;
        while current.is_some() {
            let item: I = self.file.read(current)?;
            keys.push(item.key());
            current = item.next();
        }
        Ok(keys)
    }

    /// Lazy walk over every bucket; each call starts from bucket zero
    pub fn iter(&self) -> HashMapIter<I> {
        HashMapIter {
            file: self.file.clone(),
            base: self.base,
            bucket_count: self.bucket_count,
            bucket: 0,
            current: Address::NONE,
            done: false,
            _marker: PhantomData,
        }
    }
}

pub struct HashMapIter<I: HashItem> {
    file: Arc<StorageFile>,
    base: Address,
    bucket_count: u32,
    bucket: u32,
    current: Address,
    done: bool,
    _marker: PhantomData<fn() -> I>,
}

impl<I: HashItem> Iterator for HashMapIter<I> {
    type Item = Result<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.current.is_none() {
            if self.bucket >= self.bucket_count {
                self.done = true;
                return None;
            }
            let slot = self
                .file
                .read::<BucketHead>(BucketArray::head_address(self.base, self.bucket));
            self.bucket += 1;
            match slot {
                Ok(slot) => self.current = slot.head,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        match self.file.read::<I>(self.current) {
            Ok(item) => {
                self.current = item.next();
                Some(Ok(item))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
