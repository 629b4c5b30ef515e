use std::io::Read;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::allocator::Allocator;
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// First-child / next-sibling trie node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermNode {
    pub address: Address,
    pub character: char,
    pub sibling: Address,
    pub child: Address,
    pub frequency: u32,     // Documents posted under this term
    pub posting: Address,   // Head of the posting list
}

impl TermNode {
    /// Character of the root node; never part of a term
    pub const ROOT: char = '\0';

    pub fn new(address: Address, character: char) -> Self {
        TermNode {
            address,
            character,
            sibling: Address::NONE,
            child: Address::NONE,
            frequency: 0,
            posting: Address::NONE,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.posting.is_some()
    }
}

impl Segment for TermNode {
    const KIND: SegmentKind = SegmentKind::TermNode;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_u32(buf, self.character as u32);
        Codec::put_address(buf, self.sibling);
        Codec::put_address(buf, self.child);
        Codec::put_u32(buf, self.frequency);
        Codec::put_address(buf, self.posting);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        let code = Codec::get_u32(reader)?;
        let character = char::from_u32(code).ok_or_else(|| {
            Error::new(ErrorKind::Parse, format!("Invalid character {:#x} in term node {}", code, address))
        })?;

        Ok(TermNode {
            address,
            character,
            sibling: Codec::get_address(reader)?,
            child: Codec::get_address(reader)?,
            frequency: Codec::get_u32(reader)?,
            posting: Codec::get_address(reader)?,
        })
    }
}

/// Character trie rooted at a fixed address of a term index file
pub struct Trie<'a> {
    file: &'a StorageFile,
    allocator: &'a Allocator,
    root: Address,
}

impl<'a> Trie<'a> {
    pub fn new(file: &'a StorageFile, allocator: &'a Allocator, root: Address) -> Self {
        Trie { file, allocator, root }
    }

    /// Writes an empty root node
    pub fn initialize(&self) -> Result<()> {
        self.file.write(&TermNode::new(self.root, TermNode::ROOT))
    }

    pub fn root(&self) -> Result<TermNode> {
        self.file.read(self.root)
    }

    /// (predecessor, child with a character equal to or greater than `character`)
    fn locate_child(&self, parent: &TermNode, character: char) -> Result<(Option<TermNode>, Option<TermNode>)> {
        let mut previous = None;
        let mut current = parent.child;
        while current.is_some() {
            let node: TermNode = self.file.read(current)?;
            if node.character >= character {
                return Ok((previous, Some(node)));
            }
            current = node.sibling;
            previous = Some(node);
        }
        Ok((previous, None))
    }

    pub fn child(&self, parent: &TermNode, character: char) -> Result<Option<TermNode>> {
        let (_, found) = self.locate_child(parent, character)?;
        Ok(found.filter(|node| node.character == character))
    }

    /// Walks the path of `term`, creating missing nodes in sorted sibling position
    pub fn insert(&self, term: &str) -> Result<TermNode> {
        if term.is_empty() {
            return Err(Error::invalid_argument("Empty term"));
        }

        let mut node = self.root()?;
        for character in term.chars() {
            let (previous, found) = self.locate_child(&node, character)?;
            node = match found {
                Some(existing) if existing.character == character => existing,
                successor => {
                    let mut child = TermNode::new(self.allocator.alloc(SegmentKind::TermNode)?, character);
                    child.sibling = successor.map(|s| s.address).unwrap_or(Address::NONE);
                    self.file.write(&child)?;

                    match previous {
                        Some(mut previous) => {
                            previous.sibling = child.address;
                            self.file.write(&previous)?;
                        }
                        None => {
                            node.child = child.address;
                            self.file.write(&node)?;
                        }
                    }
                    child
                }
            };
        }
        Ok(node)
    }

    /// Read-only descent; `None` when any character is missing
    pub fn lookup(&self, term: &str) -> Result<Option<TermNode>> {
        if term.is_empty() {
            return Ok(None);
        }

        let mut node = self.root()?;
        for character in term.chars() {
            match self.child(&node, character)? {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    /// Every term owning postings, in character order
    pub fn terms(&self) -> Result<Vec<(String, TermNode)>> {
        let mut terms = Vec::new();
        // (node address, prefix length before this node's character)
        let mut stack: Vec<(Address, usize)> = Vec::new();
        let mut prefix = String::new();

        let root = self.root()?;
        if root.child.is_some() {
            stack.push((root.child, 0));
        }

        while let Some((address, depth)) = stack.pop() {
            let node: TermNode = self.file.read(address)?;
            while prefix.chars().count() > depth {
                prefix.pop();
            }
            prefix.push(node.character);

            if node.is_terminal() {
                terms.push((prefix.clone(), node.clone()));
            }
            if node.sibling.is_some() {
                stack.push((node.sibling, depth));
            }
            if node.child.is_some() {
                stack.push((node.child, depth + 1));
            }
        }
        Ok(terms)
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

    fn open(dir: &TempDir) -> (Arc<StorageFile>, Allocator, Address) {
        let config = Config {
            maintenance_interval: Duration::from_secs(3600),
            ..Config::with_data_dir(dir.path())
        };
        let file = Arc::new(StorageFile::open(dir.path().join("t.wrt"), &config).unwrap());
        file.alloc(16).unwrap();
        let state = file.alloc(AllocatorState::encoded_size(TERM_INDEX_CLASSES.len())).unwrap();
        let root = file.alloc(SegmentKind::TermNode.fixed_size().unwrap()).unwrap();
        let allocator = Allocator::create(file.clone(), state, TERM_INDEX_CLASSES).unwrap();
        (file, allocator, root)
    }

    #[test]
    fn test_insert_then_lookup() {
        let dir = TempDir::new().unwrap();
        let (file, allocator, root) = open(&dir);
        let trie = Trie::new(&file, &allocator, root);
        trie.initialize().unwrap();

        let helena = trie.insert("helena").unwrap();
        let helge = trie.insert("helge").unwrap();
        assert_ne!(helena.address, helge.address);
        assert_eq!(trie.insert("helena").unwrap().address, helena.address);

        assert_eq!(trie.lookup("helge").unwrap().unwrap().address, helge.address);
        assert_eq!(trie.lookup("hel").unwrap().unwrap().character, 'l');
        assert!(trie.lookup("helium").unwrap().is_none());
        assert!(trie.lookup("").unwrap().is_none());
    }

    #[test]
    fn test_siblings_sorted_and_unique() {
        let dir = TempDir::new().unwrap();
        let (file, allocator, root) = open(&dir);
        let trie = Trie::new(&file, &allocator, root);
        trie.initialize().unwrap();

        for term in ["m", "c", "x", "a", "c", "ü"] {
            trie.insert(term).unwrap();
        }

        let mut characters = Vec::new();
        let mut current = trie.root().unwrap().child;
        while current.is_some() {
            let node: TermNode = file.read(current).unwrap();
            characters.push(node.character);
            current = node.sibling;
        }
        assert_eq!(characters, vec!['a', 'c', 'm', 'x', 'ü']);
    }

    #[test]
    fn test_terms_lists_only_terminal_nodes() {
        let dir = TempDir::new().unwrap();
        let (file, allocator, root) = open(&dir);
        let trie = Trie::new(&file, &allocator, root);
        trie.initialize().unwrap();

        for term in ["helge", "helena", "hel", "anna"] {
            let mut node = trie.insert(term).unwrap();
            if term != "hel" {
                node.posting = Address(1);
                file.write(&node).unwrap();
            }
        }

        let terms: Vec<String> = trie.terms().unwrap().into_iter().map(|(term, _)| term).collect();
        assert_eq!(terms, vec!["anna", "helena", "helge"]);
    }

    #[test]
    fn test_empty_term_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (file, allocator, root) = open(&dir);
        let trie = Trie::new(&file, &allocator, root);
        trie.initialize().unwrap();

        assert!(trie.insert("").is_err());
    }
}
