pub mod segment;
pub mod codec;
pub mod cache;
pub mod file;
pub mod file_lock;
pub mod header;
pub mod allocator;
pub mod layout;
