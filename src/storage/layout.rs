use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::storage::allocator::{Allocator, AllocatorState};
use crate::storage::file::StorageFile;
use crate::storage::header::{HeaderSegment, Statistic, StatisticSegment};
use crate::storage::segment::{Address, SegmentKind};

/// Physical index file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFileKind {
    DocumentStore,
    ForwardIndex,
    ReverseIndex,
    TermReverseIndex,
    NumericReverseIndex,
}

impl IndexFileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFileKind::DocumentStore => "wds",
            IndexFileKind::ForwardIndex => "wfi",
            IndexFileKind::ReverseIndex => "wri",
            IndexFileKind::TermReverseIndex => "wrt",
            IndexFileKind::NumericReverseIndex => "wrn",
        }
    }

    /// Header tag identifying the file type on reopen
    pub fn tag(&self) -> [u8; 3] {
        match self {
            IndexFileKind::DocumentStore => *b"WDS",
            IndexFileKind::ForwardIndex => *b"WFI",
            IndexFileKind::ReverseIndex => *b"WRI",
            IndexFileKind::TermReverseIndex => *b"WRT",
            IndexFileKind::NumericReverseIndex => *b"WRN",
        }
    }
}

/// Directory and naming scheme for index files
#[derive(Debug, Clone)]
pub struct IndexContext {
    pub data_dir: PathBuf,
    pub config: Config,
}

impl IndexContext {
    pub fn new(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        Ok(IndexContext {
            data_dir: config.data_dir.clone(),
            config,
        })
    }

    pub fn document_store_path(&self, type_name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", type_name, IndexFileKind::DocumentStore.extension()))
    }

    pub fn index_path(
        &self,
        type_name: &str,
        field: &str,
        culture: Option<&str>,
        kind: IndexFileKind,
    ) -> PathBuf {
        match culture {
            Some(culture) => self.data_dir.join(format!("{}.{}.{}.{}", type_name, field, culture, kind.extension())),
            None => self.data_dir.join(format!("{}.{}.{}", type_name, field, kind.extension())),
        }
    }
}

// [ HEADER ]          <- byte 0
// [ STATISTIC ]
// [ ALLOCATOR STATE ]
// [ ROOT ]            <- bucket array / trie root / tree root
// [ nodes, postings, positions, chunks ... ]

/// Fixed addresses of the structures every index file starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLayout {
    pub kind: IndexFileKind,
    pub header: Address,
    pub statistic: Address,
    pub allocator: Address,
    pub root: Address,
    pub root_size: u64,
}

impl FileLayout {
    pub fn new(kind: IndexFileKind, classes: &[SegmentKind], root_size: u64) -> Self {
        let header = Address(0);
        let statistic = header.offset(HeaderSegment::SIZE);
        let allocator = statistic.offset(StatisticSegment::SIZE);
        let root = allocator.offset(AllocatorState::encoded_size(classes.len()));

        FileLayout {
            kind,
            header,
            statistic,
            allocator,
            root,
            root_size,
        }
    }

    /// Allocates the prologue in order on an empty (or reset) file and writes
    /// the header and a zero statistic. Allocator and root are left to the owner.
    pub fn initialize(&self, file: &StorageFile) -> Result<()> {
        let addresses = [
            file.alloc(HeaderSegment::SIZE)?,
            file.alloc(StatisticSegment::SIZE)?,
            file.alloc(self.root.0 - self.allocator.0)?,
            file.alloc(self.root_size)?,
        ];
        if addresses != [self.header, self.statistic, self.allocator, self.root] {
            return Err(Error::internal(format!(
                "Prologue allocated at {:?}, expected {:?}",
                addresses,
                [self.header, self.statistic, self.allocator, self.root]
            )));
        }

        file.write(&HeaderSegment::new(self.header, self.kind.tag()))?;
        file.write(&StatisticSegment { address: self.statistic, count: 0 })?;
        Ok(())
    }

    pub fn validate(&self, file: &StorageFile) -> Result<()> {
        let header: HeaderSegment = file.read(self.header)?;
        header.validate(self.kind.tag())
    }
}

/// An opened index file with its always-present structures
pub struct Prologue {
    pub layout: FileLayout,
    pub file: Arc<StorageFile>,
    pub statistic: Statistic,
    pub allocator: Arc<Allocator>,
    pub created: bool,
}

impl Prologue {
    /// Opens (or creates) the file at `path`. On creation the caller still
    /// has to write its root structure at `layout.root`.
    pub fn open(
        path: PathBuf,
        config: &Config,
        kind: IndexFileKind,
        classes: &'static [SegmentKind],
        root_size: u64,
    ) -> Result<Self> {
        let layout = FileLayout::new(kind, classes, root_size);
        let file = Arc::new(StorageFile::open(&path, config)?);
        let created = file.is_new();

        let allocator = if created {
            layout.initialize(&file)?;
            Allocator::create(file.clone(), layout.allocator, classes)?
        } else {
            layout.validate(&file)?;
            Allocator::load(file.clone(), layout.allocator, classes)?
        };

        info!(path = %path.display(), ?kind, created, "Opened index file");

        Ok(Prologue {
            layout,
            statistic: Statistic::new(file.clone(), layout.statistic),
            allocator: Arc::new(allocator),
            file,
            created,
        })
    }

    /// Logical wipe: the file is not shrunk, prior addresses become unreachable
    pub fn reset(&self) -> Result<()> {
        self.file.reset();
        self.layout.initialize(&self.file)?;
        self.allocator.reset()
    }

    /// Closes the file and removes it from disk
    pub fn delete(&self) -> Result<()> {
        self.file.close()?;
        fs::remove_file(self.file.path())?;
        info!(path = %self.file.path().display(), "Dropped index file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::allocator::DOCUMENT_STORE_CLASSES;
    use tempfile::TempDir;

    #[test]
    fn test_file_names() {
        let dir = TempDir::new().unwrap();
        let context = IndexContext::new(Config::with_data_dir(dir.path())).unwrap();

        assert!(context.document_store_path("Customer").ends_with("Customer.wds"));
        assert!(context
            .index_path("Customer", "Name", Some("de"), IndexFileKind::TermReverseIndex)
            .ends_with("Customer.Name.de.wrt"));
        assert!(context
            .index_path("Customer", "Age", None, IndexFileKind::NumericReverseIndex)
            .ends_with("Customer.Age.wrn"));
    }

    #[test]
    fn test_layout_addresses_follow_allocation_order() {
        let layout = FileLayout::new(IndexFileKind::DocumentStore, DOCUMENT_STORE_CLASSES, 100);
        assert_eq!(layout.header, Address(0));
        assert_eq!(layout.statistic, Address(4));
        assert_eq!(layout.allocator, Address(12));
        assert_eq!(layout.root, Address(12 + 1 + 8 + 16));
    }

    #[test]
    fn test_reopen_with_other_kind_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.wds");
        let config = Config::with_data_dir(dir.path());
        {
            let prologue = Prologue::open(path.clone(), &config, IndexFileKind::DocumentStore, DOCUMENT_STORE_CLASSES, 8).unwrap();
            assert!(prologue.created);
            prologue.file.close().unwrap();
        }

        let err = Prologue::open(path, &config, IndexFileKind::TermReverseIndex, DOCUMENT_STORE_CLASSES, 8);
        assert!(err.is_err());
    }
}
