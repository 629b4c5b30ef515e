use std::io::Read;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::storage::segment::Address;

/// Little-endian field encoding shared by every segment type
pub struct Codec;

impl Codec {
    pub fn put_u8(buf: &mut Vec<u8>, value: u8) {
        buf.push(value);
    }

    pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(buf: &mut Vec<u8>, value: f64) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_address(buf: &mut Vec<u8>, address: Address) {
        Self::put_u64(buf, address.0);
    }

    pub fn put_doc_id(buf: &mut Vec<u8>, id: &DocId) {
        buf.extend_from_slice(id.as_bytes());
    }

    /// Writes `data` zero-padded to exactly `width` bytes
    pub fn put_padded(buf: &mut Vec<u8>, data: &[u8], width: usize) {
        let len = data.len().min(width);
        buf.extend_from_slice(&data[..len]);
        buf.resize(buf.len() + (width - len), 0);
    }

    pub fn get_u8<R: Read>(reader: &mut R) -> Result<u8> {
        let mut bytes = [0u8; 1];
        reader.read_exact(&mut bytes)?;
        Ok(bytes[0])
    }

    pub fn get_u32<R: Read>(reader: &mut R) -> Result<u32> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn get_u64<R: Read>(reader: &mut R) -> Result<u64> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn get_f64<R: Read>(reader: &mut R) -> Result<f64> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(f64::from_le_bytes(bytes))
    }

    pub fn get_address<R: Read>(reader: &mut R) -> Result<Address> {
        Ok(Address(Self::get_u64(reader)?))
    }

    pub fn get_doc_id<R: Read>(reader: &mut R) -> Result<DocId> {
        let mut bytes = [0u8; 16];
        reader.read_exact(&mut bytes)?;
        Ok(DocId::from_bytes(bytes))
    }

    pub fn get_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}
