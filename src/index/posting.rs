use std::io::Read;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::trie::TermNode;
use crate::storage::allocator::Allocator;
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// One document under a term, linked in ascending id order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPosting {
    pub address: Address,
    pub id: DocId,
    pub next: Address,
    pub positions: Address,  // Head of the position list
}

impl TermPosting {
    pub fn new(address: Address, id: DocId) -> Self {
        TermPosting {
            address,
            id,
            next: Address::NONE,
            positions: Address::NONE,
        }
    }
}

impl Segment for TermPosting {
    const KIND: SegmentKind = SegmentKind::TermPosting;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_doc_id(buf, &self.id);
        Codec::put_address(buf, self.next);
        Codec::put_address(buf, self.positions);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(TermPosting {
            address,
            id: Codec::get_doc_id(reader)?,
            next: Codec::get_address(reader)?,
            positions: Codec::get_address(reader)?,
        })
    }
}

/// Token offset of one occurrence, linked in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub address: Address,
    pub offset: u32,
    pub next: Address,
}

impl Position {
    pub fn new(address: Address, offset: u32) -> Self {
        Position {
            address,
            offset,
            next: Address::NONE,
        }
    }
}

impl Segment for Position {
    const KIND: SegmentKind = SegmentKind::Position;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_u32(buf, self.offset);
        Codec::put_address(buf, self.next);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(Position {
            address,
            offset: Codec::get_u32(reader)?,
            next: Codec::get_address(reader)?,
        })
    }
}

/// Sorted posting and position list operations of one term index file
pub struct PostingLists<'a> {
    file: &'a StorageFile,
    allocator: &'a Allocator,
}

impl<'a> PostingLists<'a> {
    pub fn new(file: &'a StorageFile, allocator: &'a Allocator) -> Self {
        PostingLists { file, allocator }
    }

    /// (predecessor, posting with an id equal to or greater than `id`)
    fn locate(&self, node: &TermNode, id: DocId) -> Result<(Option<TermPosting>, Option<TermPosting>)> {
        let mut previous = None;
        let mut current = node.posting;
        while current.is_some() {
            let posting: TermPosting = self.file.read(current)?;
            if posting.id >= id {
                return Ok((previous, Some(posting)));
            }
            current = posting.next;
            previous = Some(posting);
        }
        Ok((previous, None))
    }

    pub fn find(&self, node: &TermNode, id: DocId) -> Result<Option<TermPosting>> {
        let (_, found) = self.locate(node, id)?;
        Ok(found.filter(|posting| posting.id == id))
    }

    /// Links a posting for `id` under `node`; false if one already existed
    pub fn insert(&self, node: &mut TermNode, id: DocId) -> Result<(TermPosting, bool)> {
        let (previous, found) = self.locate(node, id)?;
        if let Some(posting) = &found {
            if posting.id == id {
                return Ok((posting.clone(), false));
            }
        }

        let mut posting = TermPosting::new(self.allocator.alloc(SegmentKind::TermPosting)?, id);
        posting.next = found.map(|successor| successor.address).unwrap_or(Address::NONE);
        self.file.write(&posting)?;

        match previous {
            Some(mut previous) => {
                previous.next = posting.address;
                self.file.write(&previous)?;
            }
            None => node.posting = posting.address,
        }
        node.frequency += 1;
        self.file.write(node)?;
        Ok((posting, true))
    }

    /// Unlinks the posting for `id` and frees it together with its positions
    pub fn remove(&self, node: &mut TermNode, id: DocId) -> Result<bool> {
        let (previous, found) = self.locate(node, id)?;
        let posting = match found {
            Some(posting) if posting.id == id => posting,
            _ => return Ok(false),
        };

        match previous {
            Some(mut previous) => {
                previous.next = posting.next;
                self.file.write(&previous)?;
            }
            None => node.posting = posting.next,
        }
        node.frequency = node.frequency.saturating_sub(1);
        self.file.write(node)?;

        let mut current = posting.positions;
        while current.is_some() {
            let position: Position = self.file.read(current)?;
            current = position.next;
            self.allocator.free(&position)?;
        }
        self.allocator.free(&posting)?;
        Ok(true)
    }

    /// Inserts `offset` into the posting's position list; false on duplicate
    pub fn add_position(&self, posting: &mut TermPosting, offset: u32) -> Result<bool> {
        let mut previous: Option<Position> = None;
        let mut current = posting.positions;
        while current.is_some() {
            let position: Position = self.file.read(current)?;
            if position.offset == offset {
                return Ok(false);
            }
            if position.offset > offset {
                break;
            }
            current = position.next;
            previous = Some(position);
        }

        let mut position = Position::new(self.allocator.alloc(SegmentKind::Position)?, offset);
        position.next = current;
        self.file.write(&position)?;

        match previous {
            Some(mut previous) => {
                previous.next = position.address;
                self.file.write(&previous)?;
            }
            None => {
                posting.positions = position.address;
                self.file.write(posting)?;
            }
        }
        Ok(true)
    }

    pub fn postings(&self, node: &TermNode) -> Result<Vec<TermPosting>> {
        let mut postings = Vec::new();
        let mut current = node.posting;
        while current.is_some() {
            let posting: TermPosting = self.file.read(current)?;
            current = posting.next;
            postings.push(posting);
        }
        Ok(postings)
    }

    pub fn positions(&self, posting: &TermPosting) -> Result<Vec<u32>> {
        let mut offsets = Vec::new();
        let mut current = posting.positions;
        while current.is_some() {
            let position: Position = self.file.read(current)?;
            offsets.push(position.offset);
            current = position.next;
        }
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use crate::core::config::Config;
    use crate::storage::allocator::{AllocatorState, TERM_INDEX_CLASSES};

    struct Fixture {
        _dir: TempDir,
        file: Arc<StorageFile>,
        allocator: Allocator,
        node: TermNode,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = Config {
            maintenance_interval: Duration::from_secs(3600),
            ..Config::with_data_dir(dir.path())
        };
        let file = Arc::new(StorageFile::open(dir.path().join("p.wrt"), &config).unwrap());
        file.alloc(16).unwrap();
        let state = file.alloc(AllocatorState::encoded_size(TERM_INDEX_CLASSES.len())).unwrap();
        let allocator = Allocator::create(file.clone(), state, TERM_INDEX_CLASSES).unwrap();
        let node = TermNode::new(allocator.alloc(SegmentKind::TermNode).unwrap(), 'a');
        file.write(&node).unwrap();
        Fixture { _dir: dir, file, allocator, node }
    }

    #[test]
    fn test_postings_sorted_and_deduplicated() {
        let mut f = fixture();
        let lists = PostingLists::new(&f.file, &f.allocator);

        for n in [5u128, 1, 9, 5, 3] {
            lists.insert(&mut f.node, DocId::from_u128(n)).unwrap();
        }

        let ids: Vec<DocId> = lists.postings(&f.node).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, [1u128, 3, 5, 9].map(DocId::from_u128).to_vec());
        assert_eq!(f.node.frequency, 4);
    }

    #[test]
    fn test_positions_sorted_and_deduplicated() {
        let mut f = fixture();
        let lists = PostingLists::new(&f.file, &f.allocator);
        let (mut posting, _) = lists.insert(&mut f.node, DocId::from_u128(1)).unwrap();

        for offset in [7, 2, 7, 0, 4] {
            lists.add_position(&mut posting, offset).unwrap();
        }

        let stored = lists.find(&f.node, DocId::from_u128(1)).unwrap().unwrap();
        assert_eq!(lists.positions(&stored).unwrap(), vec![0, 2, 4, 7]);
    }

    #[test]
    fn test_remove_frees_positions_and_keeps_other_postings() {
        let mut f = fixture();
        let lists = PostingLists::new(&f.file, &f.allocator);
        for n in 1..=3u128 {
            let (mut posting, _) = lists.insert(&mut f.node, DocId::from_u128(n)).unwrap();
            lists.add_position(&mut posting, 1).unwrap();
            lists.add_position(&mut posting, 2).unwrap();
        }

        assert!(lists.remove(&mut f.node, DocId::from_u128(2)).unwrap());
        assert!(!lists.remove(&mut f.node, DocId::from_u128(2)).unwrap());

        assert_eq!(f.allocator.free_list(SegmentKind::Position).unwrap().len(), 2);
        assert_eq!(f.allocator.free_list(SegmentKind::TermPosting).unwrap().len(), 1);
        assert_eq!(f.node.frequency, 2);

        let first = lists.find(&f.node, DocId::from_u128(1)).unwrap().unwrap();
        let third = lists.find(&f.node, DocId::from_u128(3)).unwrap().unwrap();
        assert_eq!(lists.positions(&first).unwrap(), vec![1, 2]);
        assert_eq!(lists.positions(&third).unwrap(), vec![1, 2]);
    }
}
