pub mod core;
pub mod storage;
pub mod compression;
pub mod index;
pub mod search;

/*
┌────────────────────────────── SEGSTORE FILE ARCHITECTURE ──────────────────────────────┐

  DocumentStore<T>            TermIndex                    NumericIndex
  (<Type>.wds)                (<Type>.<field>[.<c>].wrt)   (<Type>.<field>.wrn)
        │                           │                            │
  SegmentHashMap              Trie + PostingLists          NumericTree
  item → chunk → chunk        node → posting → position    node → posting BST
        │                           │                            │
        └──────────────┬────────────┴──────────────┬─────────────┘
                       │                           │
                   Allocator                    Prologue
            (free list per size class)   (header, statistic, allocator
                       │                  state, root at fixed offsets)
                       │                           │
                       └────────────┬──────────────┘
                                    │
                              StorageFile
               ┌────────────────────┼─────────────────────┐
           ReadCache            WriteCache           maintenance thread
      (decoded, lifetime)    (encoded, dirty)     (decay + flush per tick)
                                    │
                               index file on disk

└──────────────────────────────────────────────────────────────────────────────────────────┘
*/
