use std::path::PathBuf;
use std::time::Duration;
use crate::compression::compress::CompressionType;

/// Payload bytes carried by one document item or chunk segment
pub const CHUNK_SIZE: usize = 256;

/// On-disk format version written into every header segment
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,

    pub cache_lifetime: u32,                // Maintenance ticks an unused segment stays cached
    pub maintenance_interval: Duration,     // Period of the decay + flush task
    pub bucket_capacity: usize,             // Requested hash buckets for document stores
    pub compression: CompressionType,       // Document payload compression
    pub io_buffer_size: usize,              // Buffered reader/writer capacity
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            cache_lifetime: 60,
            maintenance_interval: Duration::from_secs(1),
            bucket_capacity: 1024,
            compression: CompressionType::Lz4,
            io_buffer_size: 64 * 1024,
        }
    }
}

impl Config {
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        Config {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }
}
