use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::Read;
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::storage::allocator::Allocator;
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// Holds the address of the value tree's root node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericRoot {
    pub address: Address,
    pub root: Address,
}

impl Segment for NumericRoot {
    const KIND: SegmentKind = SegmentKind::NumericRoot;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_address(buf, self.root);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(NumericRoot {
            address,
            root: Codec::get_address(reader)?,
        })
    }
}

/// Value tree node owning a posting tree
#[derive(Debug, Clone, PartialEq)]
pub struct NumericNode {
    pub address: Address,
    pub value: f64,
    pub left: Address,
    pub right: Address,
    pub frequency: u32,
    pub posting: Address,   // Root of the posting tree
}

impl NumericNode {
    pub fn new(address: Address, value: f64) -> Self {
        NumericNode {
            address,
            value,
            left: Address::NONE,
            right: Address::NONE,
            frequency: 0,
            posting: Address::NONE,
        }
    }
}

impl Segment for NumericNode {
    const KIND: SegmentKind = SegmentKind::NumericNode;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_f64(buf, self.value);
        Codec::put_address(buf, self.left);
        Codec::put_address(buf, self.right);
        Codec::put_u32(buf, self.frequency);
        Codec::put_address(buf, self.posting);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(NumericNode {
            address,
            value: Codec::get_f64(reader)?,
            left: Codec::get_address(reader)?,
            right: Codec::get_address(reader)?,
            frequency: Codec::get_u32(reader)?,
            posting: Codec::get_address(reader)?,
        })
    }
}

/// Posting tree node keyed by document id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericPosting {
    pub address: Address,
    pub id: DocId,
    pub left: Address,
    pub right: Address,
}

impl NumericPosting {
    pub fn new(address: Address, id: DocId) -> Self {
        NumericPosting {
            address,
            id,
            left: Address::NONE,
            right: Address::NONE,
        }
    }
}

impl Segment for NumericPosting {
    const KIND: SegmentKind = SegmentKind::NumericPosting;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_doc_id(buf, &self.id);
        Codec::put_address(buf, self.left);
        Codec::put_address(buf, self.right);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(NumericPosting {
            address,
            id: Codec::get_doc_id(reader)?,
            left: Codec::get_address(reader)?,
            right: Codec::get_address(reader)?,
        })
    }
}

/// Comparison applied by a range traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Bound {
    fn accepts(&self, value: f64, search: f64) -> bool {
        let ordering = value.total_cmp(&search);
        match self {
            Bound::Equal => ordering == Ordering::Equal,
            Bound::GreaterThan => ordering == Ordering::Greater,
            Bound::GreaterThanOrEqual => ordering != Ordering::Less,
            Bound::LessThan => ordering == Ordering::Less,
            Bound::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }

    /// Left values are all below `value`, so they can only match an upper bound
    /// or a lower bound that `value` itself exceeds
    fn visit_left(&self, value: f64, search: f64) -> bool {
        match self {
            Bound::LessThan | Bound::LessThanOrEqual => true,
            Bound::Equal | Bound::GreaterThan | Bound::GreaterThanOrEqual => {
                value.total_cmp(&search) == Ordering::Greater
            }
        }
    }

    fn visit_right(&self, value: f64, search: f64) -> bool {
        match self {
            Bound::GreaterThan | Bound::GreaterThanOrEqual => true,
            Bound::Equal | Bound::LessThan | Bound::LessThanOrEqual => {
                value.total_cmp(&search) == Ordering::Less
            }
        }
    }
}

pub fn check_value(value: f64) -> Result<()> {
    if value.is_nan() {
        return Err(Error::invalid_argument("NaN cannot be indexed or searched"));
    }
    Ok(())
}

/// Parent slot pointing at a posting tree node
#[derive(Debug, Clone, Copy)]
enum Link {
    Node,               // NumericNode::posting
    Left(Address),
    Right(Address),
}

/// Unbalanced value tree with one unbalanced posting tree per value
pub struct NumericTree<'a> {
    file: &'a StorageFile,
    allocator: &'a Allocator,
    root: Address,
}

impl<'a> NumericTree<'a> {
    pub fn new(file: &'a StorageFile, allocator: &'a Allocator, root: Address) -> Self {
        NumericTree { file, allocator, root }
    }

    pub fn initialize(&self) -> Result<()> {
        self.file.write(&NumericRoot {
            address: self.root,
            root: Address::NONE,
        })
    }

    fn root_node(&self) -> Result<Address> {
        Ok(self.file.read::<NumericRoot>(self.root)?.root)
    }

    /// Returns the node of `value`, creating it as a new leaf when absent
    pub fn insert(&self, value: f64) -> Result<NumericNode> {
        check_value(value)?;

        let mut current = self.root_node()?;
        let mut parent: Option<NumericNode> = None;
        while current.is_some() {
            let node: NumericNode = self.file.read(current)?;
            current = match value.total_cmp(&node.value) {
                Ordering::Equal => return Ok(node),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
            parent = Some(node);
        }

        let node = NumericNode::new(self.allocator.alloc(SegmentKind::NumericNode)?, value);
        self.file.write(&node)?;

        match parent {
            Some(mut parent) => {
                if value.total_cmp(&parent.value) == Ordering::Less {
                    parent.left = node.address;
                } else {
                    parent.right = node.address;
                }
                self.file.write(&parent)?;
            }
            None => self.file.write(&NumericRoot {
                address: self.root,
                root: node.address,
            })?,
        }
        Ok(node)
    }

    pub fn find(&self, value: f64) -> Result<Option<NumericNode>> {
        check_value(value)?;

        let mut current = self.root_node()?;
        while current.is_some() {
            let node: NumericNode = self.file.read(current)?;
            current = match value.total_cmp(&node.value) {
                Ordering::Equal => return Ok(Some(node)),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        Ok(None)
    }

    /// Adds `id` to the node's posting tree; false if already posted
    pub fn add_posting(&self, node: &mut NumericNode, id: DocId) -> Result<bool> {
        let mut current = node.posting;
        let mut parent: Option<NumericPosting> = None;
        while current.is_some() {
            let posting: NumericPosting = self.file.read(current)?;
            current = match id.cmp(&posting.id) {
                Ordering::Equal => return Ok(false),
                Ordering::Less => posting.left,
                Ordering::Greater => posting.right,
            };
            parent = Some(posting);
        }

        let posting = NumericPosting::new(self.allocator.alloc(SegmentKind::NumericPosting)?, id);
        self.file.write(&posting)?;

        match parent {
            Some(mut parent) => {
                if id < parent.id {
                    parent.left = posting.address;
                } else {
                    parent.right = posting.address;
                }
                self.file.write(&parent)?;
            }
            None => node.posting = posting.address,
        }
        node.frequency += 1;
        self.file.write(node)?;
        Ok(true)
    }

    fn relink(&self, node: &mut NumericNode, link: Link, target: Address) -> Result<()> {
        match link {
            Link::Node => {
                node.posting = target;
                self.file.write(node)
            }
            Link::Left(address) => {
                let mut parent: NumericPosting = self.file.read(address)?;
                parent.left = target;
                self.file.write(&parent)
            }
            Link::Right(address) => {
                let mut parent: NumericPosting = self.file.read(address)?;
                parent.right = target;
                self.file.write(&parent)
            }
        }
    }

    /// Removes `id` from the node's posting tree, promoting the in-order
    /// successor when the removed posting has two children
    pub fn remove_posting(&self, node: &mut NumericNode, id: DocId) -> Result<bool> {
        let mut link = Link::Node;
        let mut current = node.posting;
        let target = loop {
            if current.is_none() {
                return Ok(false);
            }
            let posting: NumericPosting = self.file.read(current)?;
            match id.cmp(&posting.id) {
                Ordering::Equal => break posting,
                Ordering::Less => {
                    link = Link::Left(posting.address);
                    current = posting.left;
                }
                Ordering::Greater => {
                    link = Link::Right(posting.address);
                    current = posting.right;
                }
            }
        };

        if target.left.is_none() || target.right.is_none() {
            let child = if target.left.is_some() { target.left } else { target.right };
            self.relink(node, link, child)?;
        } else {
            let mut successor_parent = target.address;
            let mut successor: NumericPosting = self.file.read(target.right)?;
            while successor.left.is_some() {
                successor_parent = successor.address;
                successor = self.file.read(successor.left)?;
            }

            if successor_parent != target.address {
                self.relink(node, Link::Left(successor_parent), successor.right)?;
                successor.right = target.right;
            }
            successor.left = target.left;
            self.file.write(&successor)?;
            self.relink(node, link, successor.address)?;
        }

        node.frequency = node.frequency.saturating_sub(1);
        self.file.write(node)?;
        self.allocator.free(&target)?;
        Ok(true)
    }

    /// In-order ids of the node's posting tree
    pub fn postings(&self, node: &NumericNode) -> Result<Vec<DocId>> {
        let mut ids = Vec::new();
        let mut stack = Vec::new();
        let mut current = node.posting;

        while current.is_some() || !stack.is_empty() {
            while current.is_some() {
                let posting: NumericPosting = self.file.read(current)?;
                current = posting.left;
                stack.push(posting);
            }
            if let Some(posting) = stack.pop() {
                ids.push(posting.id);
                current = posting.right;
            }
        }
        Ok(ids)
    }

    /// Pruned in-order walk collecting the postings of every accepted value
    pub fn retrieve(&self, search: f64, bound: Bound, max_results: usize) -> Result<Vec<DocId>> {
        check_value(search)?;

        let mut results = Vec::new();
        if max_results == 0 {
            return Ok(results);
        }
        if bound == Bound::Equal {
            if let Some(node) = self.find(search)? {
                results = self.postings(&node)?;
                results.truncate(max_results);
            }
            return Ok(results);
        }

        let mut seen = HashSet::new();
        let mut stack: Vec<NumericNode> = Vec::new();
        let mut current = self.root_node()?;

        while current.is_some() || !stack.is_empty() {
            while current.is_some() {
                let node: NumericNode = self.file.read(current)?;
                current = if bound.visit_left(node.value, search) { node.left } else { Address::NONE };
                stack.push(node);
            }

            let Some(node) = stack.pop() else { break };
            if bound.accepts(node.value, search) {
                for id in self.postings(&node)? {
                    if seen.insert(id) {
                        results.push(id);
                        if results.len() >= max_results {
                            return Ok(results);
                        }
                    }
                }
            }
            current = if bound.visit_right(node.value, search) { node.right } else { Address::NONE };
        }
        Ok(results)
    }

    /// Every node of the value tree, in value order
    pub fn nodes(&self) -> Result<Vec<NumericNode>> {
        let mut nodes = Vec::new();
        let mut stack: Vec<NumericNode> = Vec::new();
        let mut current = self.root_node()?;

        while current.is_some() || !stack.is_empty() {
            while current.is_some() {
                let node: NumericNode = self.file.read(current)?;
                current = node.left;
                stack.push(node);
            }
            if let Some(node) = stack.pop() {
                current = node.right;
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Longest root-to-leaf path of the value tree
    pub fn depth(&self) -> Result<usize> {
        let mut deepest = 0;
        let mut stack = vec![(self.root_node()?, 1usize)];
        while let Some((address, depth)) = stack.pop() {
            if address.is_none() {
                continue;
            }
            deepest = deepest.max(depth);
            let node: NumericNode = self.file.read(address)?;
            stack.push((node.left, depth + 1));
            stack.push((node.right, depth + 1));
        }
        Ok(deepest)
    }
}
