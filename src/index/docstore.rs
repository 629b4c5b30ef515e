use std::io::Read;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::core::config::{Config, CHUNK_SIZE};
use crate::core::error::{Error, Result};
use crate::core::stats::StorageStats;
use crate::core::types::{DocId, IndexItem};
use crate::index::hashmap::{bucket_count_for, BucketArray, HashItem, HashMapIter, SegmentHashMap};
use crate::storage::allocator::{Allocator, DOCUMENT_STORE_CLASSES};
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::layout::{FileLayout, IndexContext, IndexFileKind, Prologue};
use crate::storage::segment::{Address, Segment, SegmentKind};

/// Hash-chained record head carrying the first chunk of its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentItem {
    pub address: Address,
    pub id: DocId,
    pub next: Address,      // Next item in the bucket chain
    pub length: u32,        // Total payload bytes across all chunks
    pub chunk: Address,     // First overflow chunk
    pub data: Vec<u8>,      // At most CHUNK_SIZE bytes
}

impl DocumentItem {
    pub fn new(address: Address, id: DocId) -> Self {
        DocumentItem {
            address,
            id,
            next: Address::NONE,
            length: 0,
            chunk: Address::NONE,
            data: Vec::new(),
        }
    }
}

impl Segment for DocumentItem {
    const KIND: SegmentKind = SegmentKind::DocumentItem;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_doc_id(buf, &self.id);
        Codec::put_address(buf, self.next);
        Codec::put_u32(buf, self.length);
        Codec::put_address(buf, self.chunk);
        Codec::put_padded(buf, &self.data, CHUNK_SIZE);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        let id = Codec::get_doc_id(reader)?;
        let next = Codec::get_address(reader)?;
        let length = Codec::get_u32(reader)?;
        let chunk = Codec::get_address(reader)?;
        let mut data = Codec::get_bytes(reader, CHUNK_SIZE)?;
        data.truncate((length as usize).min(CHUNK_SIZE));

        Ok(DocumentItem { address, id, next, length, chunk, data })
    }
}

impl HashItem for DocumentItem {
    type Key = DocId;

    fn key(&self) -> DocId {
        self.id
    }

    fn next(&self) -> Address {
        self.next
    }

    fn set_next(&mut self, next: Address) {
        self.next = next;
    }

    fn bucket_hash(key: &DocId) -> u64 {
        key.stable_hash()
    }
}

/// Overflow piece of a payload larger than one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub address: Address,
    pub next: Address,
    pub data: Vec<u8>,
}

impl Segment for DocumentChunk {
    const KIND: SegmentKind = SegmentKind::DocumentChunk;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_address(buf, self.next);
        Codec::put_padded(buf, &self.data, CHUNK_SIZE);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(DocumentChunk {
            address,
            next: Codec::get_address(reader)?,
            data: Codec::get_bytes(reader, CHUNK_SIZE)?,
        })
    }
}

/// Identifier-keyed store of serialized, compressed records
pub struct DocumentStore<T: IndexItem> {
    prologue: Prologue,
    map: SegmentHashMap<DocumentItem>,
    compression: CompressionType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: IndexItem> DocumentStore<T> {
    /// Opens `<Type>.wds`; `capacity` only sizes the bucket array of a new file
    pub fn open(context: &IndexContext, capacity: usize) -> Result<Self> {
        let path = context.document_store_path(T::type_name());
        Self::open_at(path, &context.config, IndexFileKind::DocumentStore, capacity)
    }

    /// Opens an identifier-keyed record file of any kind sharing this layout
    pub(crate) fn open_at(path: PathBuf, config: &Config, kind: IndexFileKind, capacity: usize) -> Result<Self> {
        let bucket_count = bucket_count_for(capacity)?;
        let mut prologue = Prologue::open(
            path,
            config,
            kind,
            DOCUMENT_STORE_CLASSES,
            BucketArray::encoded_size(bucket_count),
        )?;

        let map = if prologue.created {
            SegmentHashMap::create(
                prologue.file.clone(),
                prologue.allocator.clone(),
                prologue.layout.root,
                bucket_count,
            )?
        } else {
            let map = SegmentHashMap::open(
                prologue.file.clone(),
                prologue.allocator.clone(),
                prologue.layout.root,
            )?;
            // The stored bucket count wins over the requested capacity
            prologue.layout = FileLayout::new(
                kind,
                DOCUMENT_STORE_CLASSES,
                BucketArray::encoded_size(map.bucket_count()),
            );
            map
        };

        Ok(DocumentStore {
            prologue,
            map,
            compression: config.compression,
            _marker: PhantomData,
        })
    }

    /// Opens with the configured default capacity
    pub fn open_default(context: &IndexContext) -> Result<Self> {
        Self::open(context, context.config.bucket_capacity)
    }

    fn file(&self) -> &Arc<StorageFile> {
        &self.prologue.file
    }

    fn allocator(&self) -> &Arc<Allocator> {
        &self.prologue.allocator
    }

    fn encode_payload(&self, item: &T) -> Result<Vec<u8>> {
        let serialized = bincode::serialize(item)?;
        let block = CompressedBlock::compress(&serialized, self.compression)?;
        let payload = block.to_bytes();
        if payload.len() > u32::MAX as usize {
            return Err(Error::invalid_argument(format!(
                "Record {} is too large ({} bytes)",
                item.id(),
                payload.len()
            )));
        }
        Ok(payload)
    }

    fn decode_payload(payload: &[u8]) -> Result<T> {
        let block = CompressedBlock::from_bytes(payload)?;
        let serialized = block.decompress()?;
        Ok(bincode::deserialize(&serialized)?)
    }

    /// Writes the overflow chain and returns the head item (not yet written)
    fn build_item(&self, address: Address, id: DocId, payload: &[u8]) -> Result<DocumentItem> {
        let head_len = payload.len().min(CHUNK_SIZE);
        let pieces: Vec<&[u8]> = payload[head_len..].chunks(CHUNK_SIZE).collect();
        let addresses = pieces
            .iter()
            .map(|_| self.allocator().alloc(SegmentKind::DocumentChunk))
            .collect::<Result<Vec<_>>>()?;

        for (i, piece) in pieces.iter().enumerate() {
            self.file().write(&DocumentChunk {
                address: addresses[i],
                next: addresses.get(i + 1).copied().unwrap_or(Address::NONE),
                data: piece.to_vec(),
            })?;
        }

        Ok(DocumentItem {
            address,
            id,
            next: Address::NONE,
            length: payload.len() as u32,
            chunk: addresses.first().copied().unwrap_or(Address::NONE),
            data: payload[..head_len].to_vec(),
        })
    }

    fn read_payload(file: &StorageFile, item: &DocumentItem) -> Result<Vec<u8>> {
        let length = item.length as usize;
        let mut payload = Vec::with_capacity(length);
        payload.extend_from_slice(&item.data);

        let mut current = item.chunk;
        while payload.len() < length {
            if current.is_none() {
                return Err(Error::internal(format!(
                    "Chunk chain of {} ends after {} of {} bytes",
                    item.id,
                    payload.len(),
                    length
                )));
            }
            let chunk: DocumentChunk = file.read(current)?;
            let take = (length - payload.len()).min(CHUNK_SIZE);
            payload.extend_from_slice(&chunk.data[..take]);
            current = chunk.next;
        }
        Ok(payload)
    }

    fn free_chunks(&self, item: &DocumentItem) -> Result<usize> {
        let mut freed = 0;
        let mut current = item.chunk;
        while current.is_some() {
            let chunk: DocumentChunk = self.file().read(current)?;
            current = chunk.next;
            self.allocator().free(&chunk)?;
            freed += 1;
        }
        Ok(freed)
    }

    /// Stores `item`; returns false when its id was already present
    pub fn add(&self, item: &T) -> Result<bool> {
        let id = item.id();
        let payload = self.encode_payload(item)?;
        let outcome = self.map.add_with(id, |address| self.build_item(address, id, &payload))?;

        let inserted = outcome.is_inserted();
        if inserted {
            self.prologue.statistic.add(1)?;
        }
        Ok(inserted)
    }

    fn remove(&self, id: DocId) -> Result<bool> {
        match self.map.remove(id)? {
            Some(item) => {
                let chunks = self.free_chunks(&item)?;
                self.prologue.statistic.add(-1)?;
                debug!(%id, chunks, "Removed record");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces the stored record (delete then add)
    pub fn update(&self, item: &T) -> Result<()> {
        self.remove(item.id())?;
        self.add(item)?;
        Ok(())
    }

    pub fn delete(&self, id: DocId) -> Result<()> {
        if !self.remove(id)? {
            return Err(Error::invalid_argument(format!("Record {} does not exist", id)));
        }
        Ok(())
    }

    pub fn get(&self, id: DocId) -> Result<Option<T>> {
        let payload = self.map.with_item(id, |item| Self::read_payload(self.file(), item))?;
        payload.map(|payload| Self::decode_payload(&payload)).transpose()
    }

    pub fn contains(&self, id: DocId) -> Result<bool> {
        Ok(self.map.get(id)?.is_some())
    }

    /// Lazy sequence over every stored record, restartable by calling again
    pub fn all(&self) -> Documents<T> {
        Documents {
            file: self.file().clone(),
            items: self.map.iter(),
            _marker: PhantomData,
        }
    }

    /// Lazy sequence over every stored identifier
    pub fn ids(&self) -> impl Iterator<Item = Result<DocId>> + use<T> {
        self.map.iter().map(|item| item.map(|item| item.id))
    }

    pub fn count(&self) -> Result<u64> {
        self.prologue.statistic.get()
    }

    /// Logical wipe; the file keeps its size
    pub fn clear(&self) -> Result<()> {
        self.prologue.reset()?;
        self.map.reinitialize()?;
        self.file().flush()?;
        info!(path = %self.file().path().display(), "Cleared record store");
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.file().stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.file().flush()
    }

    /// Closes and deletes the backing file
    pub fn drop(self) -> Result<()> {
        self.prologue.delete()
    }

    pub fn close(&self) -> Result<()> {
        self.file().close()
    }
}

pub struct Documents<T: IndexItem> {
    file: Arc<StorageFile>,
    items: HashMapIter<DocumentItem>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: IndexItem> Iterator for Documents<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.items.next()? {
            Ok(item) => item,
            Err(e) => return Some(Err(e)),
        };
        Some(
            DocumentStore::<T>::read_payload(&self.file, &item)
                .and_then(|payload| DocumentStore::<T>::decode_payload(&payload)),
        )
    }
}
