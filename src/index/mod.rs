use crate::core::error::Result;
use crate::core::types::DocId;
use crate::search::options::RetrievalOptions;

pub mod hashmap;
pub mod docstore;
pub mod forward;
pub mod trie;
pub mod posting;
pub mod term_index;
pub mod numeric;
pub mod numeric_index;

/// Operations shared by the per-field reverse indexes
pub trait ReverseIndex {
    type Value: ?Sized;

    fn add(&self, id: DocId, value: &Self::Value) -> Result<()>;

    fn delete(&self, id: DocId, value: &Self::Value) -> Result<()>;

    /// Re-indexes `id` from its previous value to the new one
    fn update(&self, id: DocId, previous: &Self::Value, value: &Self::Value) -> Result<()> {
        self.delete(id, previous)?;
        self.add(id, value)
    }

    fn retrieve(&self, input: &Self::Value, options: &RetrievalOptions) -> Result<Vec<DocId>>;

    fn all(&self) -> Result<Vec<DocId>>;

    fn count(&self) -> Result<u64>;

    fn clear(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}
