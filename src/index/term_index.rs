use std::collections::BTreeSet;
use parking_lot::RwLock;
use tracing::{debug, info};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::StorageStats;
use crate::core::types::{DocId, Token};
use crate::index::ReverseIndex;
use crate::index::forward::ForwardIndex;
use crate::index::posting::PostingLists;
use crate::index::trie::{TermNode, Trie};
use crate::search::options::{RetrievalMethod, RetrievalOptions};
use crate::search::phrase::{self, Order, PositionSource};
use crate::storage::allocator::TERM_INDEX_CLASSES;
use crate::storage::layout::{IndexContext, IndexFileKind, Prologue};
use crate::storage::segment::SegmentKind;

/// Reverse index of one text field: term trie plus positional postings,
/// with a forward index of the terms each document posted
pub struct TermIndex {
    prologue: Prologue,
    forward: ForwardIndex,
    lock: RwLock<()>,  // Structure guard for the trie, its lists and the forward index
}

impl TermIndex {
    /// Opens `<Type>.<field>[.<culture>].wrt` and its `.wfi` companion
    pub fn open(context: &IndexContext, type_name: &str, field: &str, culture: Option<&str>) -> Result<Self> {
        let path = context.index_path(type_name, field, culture, IndexFileKind::TermReverseIndex);
        let root_size = SegmentKind::TermNode.fixed_size().unwrap_or(32);
        let prologue = Prologue::open(
            path,
            &context.config,
            IndexFileKind::TermReverseIndex,
            TERM_INDEX_CLASSES,
            root_size,
        )?;

        let forward = ForwardIndex::open(context, type_name, field, culture)?;

        let index = TermIndex {
            prologue,
            forward,
            lock: RwLock::new(()),
        };
        if index.prologue.created {
            index.trie().initialize()?;
        }
        Ok(index)
    }

    fn trie(&self) -> Trie<'_> {
        Trie::new(&self.prologue.file, &self.prologue.allocator, self.prologue.layout.root)
    }

    fn lists(&self) -> PostingLists<'_> {
        PostingLists::new(&self.prologue.file, &self.prologue.allocator)
    }

    /// Posts `id` under every token, recording each token's position
    pub fn add(&self, id: DocId, tokens: &[Token]) -> Result<()> {
        let _guard = self.lock.write();
        let trie = self.trie();
        let lists = self.lists();

        let mut added = 0i64;
        for token in tokens {
            let mut node = trie.insert(&token.value)?;
            let (mut posting, inserted) = lists.insert(&mut node, id)?;
            if inserted {
                added += 1;
            }
            lists.add_position(&mut posting, token.position)?;
        }

        if added > 0 {
            self.prologue.statistic.add(added)?;
        }
        self.forward.add_terms(id, tokens.iter().map(|t| t.value.clone()))
    }

    /// Removes the postings of `id` under the given tokens' terms
    pub fn delete(&self, id: DocId, tokens: &[Token]) -> Result<()> {
        let _guard = self.lock.write();
        let terms: BTreeSet<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        self.remove_postings(id, terms.iter().copied())?;
        self.forward.remove_terms(id, terms)
    }

    /// Removes every posting of `id`, using the terms the forward index
    /// recorded for it; returns the number of postings removed
    pub fn purge(&self, id: DocId) -> Result<usize> {
        let _guard = self.lock.write();
        let terms = self.forward.remove(id)?;
        let removed = self.remove_postings(id, terms.iter().map(String::as_str))?;
        debug!(%id, removed, "Purged postings");
        Ok(removed)
    }

    /// Terms the forward index recorded for `id`
    pub fn document_terms(&self, id: DocId) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        Ok(self.forward.terms(id)?.into_iter().collect())
    }

    fn remove_postings<'t, I>(&self, id: DocId, terms: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'t str>,
    {
        let trie = self.trie();
        let lists = self.lists();

        let mut removed = 0;
        for term in terms {
            if let Some(mut node) = trie.lookup(term)? {
                if lists.remove(&mut node, id)? {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            self.prologue.statistic.add(-(removed as i64))?;
        }
        Ok(removed)
    }

    pub fn retrieve(&self, tokens: &[Token], options: &RetrievalOptions) -> Result<Vec<DocId>> {
        if options.is_range() {
            return Err(Error::new(
                ErrorKind::UnsupportedQuery,
                format!("{:?} is not supported by a term index", options.method),
            ));
        }
        if tokens.is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.lock.read();
        let trie = self.trie();
        let mut nodes = Vec::with_capacity(tokens.len());
        for token in tokens {
            match trie.lookup(&token.value)? {
                Some(node) if node.is_terminal() => nodes.push(node),
                _ => return Ok(Vec::new()),
            }
        }

        match options.method {
            RetrievalMethod::Phrase if tokens.len() > 1 => {
                self.retrieve_positional(tokens, &nodes, Order::Ordered, options)
            }
            RetrievalMethod::Proximity if tokens.len() > 1 => {
                self.retrieve_positional(tokens, &nodes, Order::Unordered, options)
            }
            _ => self.retrieve_all_terms(&nodes, options.max_results),
        }
    }

    /// Ids of the first term that every following term also posts
    fn retrieve_all_terms(&self, nodes: &[TermNode], max_results: usize) -> Result<Vec<DocId>> {
        let lists = self.lists();
        let mut results = Vec::new();

        'candidates: for posting in lists.postings(&nodes[0])? {
            for node in &nodes[1..] {
                if lists.find(node, posting.id)?.is_none() {
                    continue 'candidates;
                }
            }
            results.push(posting.id);
            if results.len() >= max_results {
                break;
            }
        }
        Ok(results)
    }

    fn retrieve_positional(
        &self,
        tokens: &[Token],
        nodes: &[TermNode],
        order: Order,
        options: &RetrievalOptions,
    ) -> Result<Vec<DocId>> {
        let lists = self.lists();
        let source = NodePositions { lists: &lists, nodes };
        let mut results = Vec::new();

        for posting in lists.postings(&nodes[0])? {
            let first = lists.positions(&posting)?;
            if phrase::document_matches(&source, tokens, posting.id, &first, order, options.distance)? {
                results.push(posting.id);
                if results.len() >= options.max_results {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Distinct ids posted under any term
    pub fn all(&self) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        let lists = self.lists();
        let mut ids = BTreeSet::new();
        for (_, node) in self.trie().terms()? {
            for posting in lists.postings(&node)? {
                ids.insert(posting.id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Every stored term, for upstream wildcard and fuzzy expansion
    pub fn terms(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        Ok(self.trie().terms()?.into_iter().map(|(term, _)| term).collect())
    }

    /// Number of documents posted under `term`
    pub fn frequency(&self, term: &str) -> Result<u32> {
        let _guard = self.lock.read();
        Ok(self.trie().lookup(term)?.map(|node| node.frequency).unwrap_or(0))
    }

    /// Offsets of `term` in document `id`
    pub fn positions(&self, term: &str, id: DocId) -> Result<Vec<u32>> {
        let _guard = self.lock.read();
        let lists = self.lists();
        match self.trie().lookup(term)? {
            Some(node) => match lists.find(&node, id)? {
                Some(posting) => lists.positions(&posting),
                None => Ok(Vec::new()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Postings stored in the file
    pub fn count(&self) -> Result<u64> {
        self.prologue.statistic.get()
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.prologue.reset()?;
        self.trie().initialize()?;
        self.prologue.file.flush()?;
        self.forward.clear()?;
        info!(path = %self.prologue.file.path().display(), "Cleared term index");
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.prologue.file.stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.prologue.file.flush()?;
        self.forward.flush()
    }

    /// Closes and deletes the backing files
    pub fn drop(self) -> Result<()> {
        self.prologue.delete()?;
        self.forward.drop()
    }

    pub fn close(&self) -> Result<()> {
        self.prologue.file.close()?;
        self.forward.close()
    }
}

/// Looks positions up again on every call
struct NodePositions<'a> {
    lists: &'a PostingLists<'a>,
    nodes: &'a [TermNode],
}

impl PositionSource for NodePositions<'_> {
    fn positions(&self, index: usize, id: DocId) -> Result<Option<Vec<u32>>> {
        match self.lists.find(&self.nodes[index], id)? {
            Some(posting) => Ok(Some(self.lists.positions(&posting)?)),
            None => Ok(None),
        }
    }
}

impl ReverseIndex for TermIndex {
    type Value = [Token];

    fn add(&self, id: DocId, value: &[Token]) -> Result<()> {
        TermIndex::add(self, id, value)
    }

    fn delete(&self, id: DocId, value: &[Token]) -> Result<()> {
        TermIndex::delete(self, id, value)
    }

    fn retrieve(&self, input: &[Token], options: &RetrievalOptions) -> Result<Vec<DocId>> {
        TermIndex::retrieve(self, input, options)
    }

    fn all(&self) -> Result<Vec<DocId>> {
        TermIndex::all(self)
    }

    fn count(&self) -> Result<u64> {
        TermIndex::count(self)
    }

    fn clear(&self) -> Result<()> {
        TermIndex::clear(self)
    }

    fn close(&self) -> Result<()> {
        TermIndex::close(self)
    }
}
