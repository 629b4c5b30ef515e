use crate::core::error::{Error, ErrorKind, Result};

/// Compressed block storage for document payloads
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedBlock {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lz4,      // Fast compression (~500 MB/s), ratio 2-3x
    Zstd,     // Better ratio (3-5x), slower (~200 MB/s)
    Snappy,   // Balanced (2-3x ratio, ~300 MB/s)
}

impl CompressionType {
    fn tag(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
            CompressionType::Zstd => 2,
            CompressionType::Snappy => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            2 => Ok(CompressionType::Zstd),
            3 => Ok(CompressionType::Snappy),
            other => Err(Error::new(ErrorKind::Parse, format!("Unknown compression tag {}", other))),
        }
    }
}

impl CompressedBlock {
    // [ tag: u8 ][ original_size: u32 ][ data ... ]
    const PREFIX: usize = 5;

    /// Compress raw byte data
    pub fn compress(data: &[u8], compression: CompressionType) -> Result<Self> {
        let compressed = match compression {
            CompressionType::None => data.to_vec(),

            CompressionType::Lz4 => lz4_flex::block::compress(data),

            CompressionType::Zstd => {
                zstd::encode_all(data, 3)?  // Level 3 is balanced
            }

            CompressionType::Snappy => {
                use snap::raw::Encoder;
                let mut encoder = Encoder::new();
                encoder.compress_vec(data)
                    .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))?
            }
        };

        Ok(CompressedBlock {
            data: compressed,
            original_size: data.len(),
            compression,
        })
    }

    pub fn decompress(&self) -> Result<Vec<u8>> {
        match self.compression {
            CompressionType::None => Ok(self.data.clone()),

            CompressionType::Lz4 => {
                Ok(lz4_flex::block::decompress(&self.data, self.original_size)?)
            }

            CompressionType::Zstd => {
                zstd::decode_all(&self.data[..])
                    .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))
            }

            CompressionType::Snappy => {
                use snap::raw::Decoder;
                let mut decoder = Decoder::new();
                decoder.decompress_vec(&self.data)
                    .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))
            }
        }
    }

    /// Self-describing byte form stored in the document store
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::PREFIX + self.data.len());
        bytes.push(self.compression.tag());
        bytes.extend_from_slice(&(self.original_size as u32).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::PREFIX {
            return Err(Error::new(ErrorKind::Parse, "Compressed block too short".to_string()));
        }

        let compression = CompressionType::from_tag(bytes[0])?;
        let original_size = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

        Ok(CompressedBlock {
            data: bytes[Self::PREFIX..].to_vec(),
            original_size,
            compression,
        })
    }
}
