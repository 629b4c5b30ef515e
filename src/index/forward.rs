use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::{DocId, IndexItem};
use crate::index::docstore::DocumentStore;
use crate::storage::layout::{IndexContext, IndexFileKind};

/// Terms one document posted in a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub id: DocId,
    pub terms: BTreeSet<String>,
}

impl IndexItem for ForwardEntry {
    fn id(&self) -> DocId {
        self.id
    }
}

/// Identifier to term list map kept next to a term index (`.wfi`).
/// Entries share the record layout of the document store.
pub struct ForwardIndex {
    store: DocumentStore<ForwardEntry>,
}

impl ForwardIndex {
    /// Opens `<Type>.<field>[.<culture>].wfi`
    pub fn open(context: &IndexContext, type_name: &str, field: &str, culture: Option<&str>) -> Result<Self> {
        let path = context.index_path(type_name, field, culture, IndexFileKind::ForwardIndex);
        let store = DocumentStore::open_at(
            path,
            &context.config,
            IndexFileKind::ForwardIndex,
            context.config.bucket_capacity,
        )?;
        Ok(ForwardIndex { store })
    }

    /// Terms recorded for `id`; empty when none
    pub fn terms(&self, id: DocId) -> Result<BTreeSet<String>> {
        Ok(self.store.get(id)?.map(|entry| entry.terms).unwrap_or_default())
    }

    pub fn add_terms<I>(&self, id: DocId, terms: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let mut entry = self.store.get(id)?.unwrap_or(ForwardEntry {
            id,
            terms: BTreeSet::new(),
        });
        let before = entry.terms.len();
        entry.terms.extend(terms);
        if entry.terms.len() != before {
            self.store.update(&entry)?;
        }
        Ok(())
    }

    /// Forgets the given terms; the entry goes away with its last term
    pub fn remove_terms<'t, I>(&self, id: DocId, terms: I) -> Result<()>
    where
        I: IntoIterator<Item = &'t str>,
    {
        let mut entry = match self.store.get(id)? {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let before = entry.terms.len();
        for term in terms {
            entry.terms.remove(term);
        }

        if entry.terms.is_empty() {
            self.store.delete(id)
        } else if entry.terms.len() != before {
            self.store.update(&entry)
        } else {
            Ok(())
        }
    }

    /// Drops the entry of `id`, returning its terms
    pub fn remove(&self, id: DocId) -> Result<BTreeSet<String>> {
        match self.store.get(id)? {
            Some(entry) => {
                self.store.delete(id)?;
                Ok(entry.terms)
            }
            None => Ok(BTreeSet::new()),
        }
    }

    /// Documents with at least one term
    pub fn count(&self) -> Result<u64> {
        self.store.count()
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn drop(self) -> Result<()> {
        self.store.drop()
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
