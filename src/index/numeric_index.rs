use std::collections::BTreeSet;
use parking_lot::RwLock;
use tracing::info;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::StorageStats;
use crate::core::types::DocId;
use crate::index::ReverseIndex;
use crate::index::numeric::{check_value, Bound, NumericTree};
use crate::search::options::{RetrievalMethod, RetrievalOptions};
use crate::storage::allocator::NUMERIC_INDEX_CLASSES;
use crate::storage::layout::{IndexContext, IndexFileKind, Prologue};
use crate::storage::segment::SegmentKind;

/// Reverse index of one numeric field
pub struct NumericIndex {
    prologue: Prologue,
    lock: RwLock<()>,
}

impl NumericIndex {
    /// Opens `<Type>.<field>.wrn`
    pub fn open(context: &IndexContext, type_name: &str, field: &str) -> Result<Self> {
        let path = context.index_path(type_name, field, None, IndexFileKind::NumericReverseIndex);
        let prologue = Prologue::open(
            path,
            &context.config,
            IndexFileKind::NumericReverseIndex,
            NUMERIC_INDEX_CLASSES,
            SegmentKind::NumericRoot.fixed_size().unwrap_or(8),
        )?;

        let index = NumericIndex {
            prologue,
            lock: RwLock::new(()),
        };
        if index.prologue.created {
            index.tree().initialize()?;
        }
        Ok(index)
    }

    fn tree(&self) -> NumericTree<'_> {
        NumericTree::new(&self.prologue.file, &self.prologue.allocator, self.prologue.layout.root)
    }

    pub fn add(&self, id: DocId, value: f64) -> Result<()> {
        check_value(value)?;
        let _guard = self.lock.write();
        let tree = self.tree();

        let mut node = tree.insert(value)?;
        if tree.add_posting(&mut node, id)? {
            self.prologue.statistic.add(1)?;
        }
        Ok(())
    }

    /// Removes the posting of `id` under `value`; the value node stays
    pub fn delete(&self, id: DocId, value: f64) -> Result<()> {
        check_value(value)?;
        let _guard = self.lock.write();
        let tree = self.tree();

        if let Some(mut node) = tree.find(value)? {
            if tree.remove_posting(&mut node, id)? {
                self.prologue.statistic.add(-1)?;
            }
        }
        Ok(())
    }

    pub fn retrieve(&self, value: f64, options: &RetrievalOptions) -> Result<Vec<DocId>> {
        let bound = match options.method {
            RetrievalMethod::Default | RetrievalMethod::Phrase => Bound::Equal,
            RetrievalMethod::GreaterThan => Bound::GreaterThan,
            RetrievalMethod::GreaterThanOrEqual => Bound::GreaterThanOrEqual,
            RetrievalMethod::LessThan => Bound::LessThan,
            RetrievalMethod::LessThanOrEqual => Bound::LessThanOrEqual,
            RetrievalMethod::Proximity => {
                return Err(Error::new(
                    ErrorKind::UnsupportedQuery,
                    "Proximity is not supported by a numeric index".to_string(),
                ));
            }
        };

        let _guard = self.lock.read();
        self.tree().retrieve(value, bound, options.max_results)
    }

    /// Distinct ids posted under any value
    pub fn all(&self) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        let tree = self.tree();
        let mut ids = BTreeSet::new();
        for node in tree.nodes()? {
            ids.extend(tree.postings(&node)?);
        }
        Ok(ids.into_iter().collect())
    }

    /// Documents posted under `value`
    pub fn frequency(&self, value: f64) -> Result<u32> {
        let _guard = self.lock.read();
        Ok(self.tree().find(value)?.map(|node| node.frequency).unwrap_or(0))
    }

    /// Longest path of the value tree; grows linearly for sorted inserts
    pub fn depth(&self) -> Result<usize> {
        let _guard = self.lock.read();
        self.tree().depth()
    }

    pub fn count(&self) -> Result<u64> {
        self.prologue.statistic.get()
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.prologue.reset()?;
        self.tree().initialize()?;
        self.prologue.file.flush()?;
        info!(path = %self.prologue.file.path().display(), "Cleared numeric index");
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.prologue.file.stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.prologue.file.flush()
    }

    /// Closes and deletes the backing file
    pub fn drop(self) -> Result<()> {
        self.prologue.delete()
    }

    pub fn close(&self) -> Result<()> {
        self.prologue.file.close()
    }
}

impl ReverseIndex for NumericIndex {
    type Value = f64;

    fn add(&self, id: DocId, value: &f64) -> Result<()> {
        NumericIndex::add(self, id, *value)
    }

    fn delete(&self, id: DocId, value: &f64) -> Result<()> {
        NumericIndex::delete(self, id, *value)
    }

    fn retrieve(&self, input: &f64, options: &RetrievalOptions) -> Result<Vec<DocId>> {
        NumericIndex::retrieve(self, *input, options)
    }

    fn all(&self) -> Result<Vec<DocId>> {
        NumericIndex::all(self)
    }

    fn count(&self) -> Result<u64> {
        NumericIndex::count(self)
    }

    fn clear(&self) -> Result<()> {
        NumericIndex::clear(self)
    }

    fn close(&self) -> Result<()> {
        NumericIndex::close(self)
    }
}
