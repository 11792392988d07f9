use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{ensure, WireError, WireStruct};

/// Per-file distribution metadata stored at the head of each file's metadata
/// record on the server that owns it.
///
/// Layout (96 bytes):
///
/// | off | field |
/// |-----|-------|
/// | 0   | magic `b"XPN"` |
/// | 3   | version `u8` |
/// | 4   | kind `u32` |
/// | 8   | block_size `u64` |
/// | 16  | file_size `u64` |
/// | 24  | replication_level `u32` |
/// | 28  | first_node `u32` |
/// | 32  | distribution_policy `u32` |
/// | 36  | reserved |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileMetadata {
    pub magic: [u8; 3],
    pub version: u8,
    pub kind: u32,
    pub block_size: u64,
    pub file_size: u64,
    pub replication_level: u32,
    pub first_node: u32,
    pub distribution_policy: u32,
}

impl FileMetadata {
    pub const MAGIC: [u8; 3] = *b"XPN";
    pub const VERSION: u8 = 1;

    /// Byte offset of `file_size` inside the encoded record.
    pub const FILE_SIZE_OFFSET: u64 = 16;

    const RESERVED: usize = 60;

    pub fn new(block_size: u64, replication_level: u32, first_node: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            kind: 0,
            block_size,
            file_size: 0,
            replication_level,
            first_node,
            distribution_policy: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == Self::MAGIC
    }
}

impl WireStruct for FileMetadata {
    const WIRE_SIZE: usize = 96;
    const NAME: &'static str = "FileMetadata";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.magic);
        buf.put_u8(self.version);
        buf.put_u32_le(self.kind);
        buf.put_u64_le(self.block_size);
        buf.put_u64_le(self.file_size);
        buf.put_u32_le(self.replication_level);
        buf.put_u32_le(self.first_node);
        buf.put_u32_le(self.distribution_policy);
        buf.put_bytes(0, Self::RESERVED);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let mut magic = [0u8; 3];
        buf.copy_to_slice(&mut magic);
        let md = Self {
            magic,
            version: buf.get_u8(),
            kind: buf.get_u32_le(),
            block_size: buf.get_u64_le(),
            file_size: buf.get_u64_le(),
            replication_level: buf.get_u32_le(),
            first_node: buf.get_u32_le(),
            distribution_policy: buf.get_u32_le(),
        };
        buf.advance(Self::RESERVED);
        Ok(md)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size_offset_matches_layout() {
        let mut md = FileMetadata::new(512 * 1024, 1, 3);
        md.file_size = 0x0102_0304_0506_0708;
        let bytes = md.to_bytes();
        let off = FileMetadata::FILE_SIZE_OFFSET as usize;
        assert_eq!(&bytes[off..off + 8], &md.file_size.to_le_bytes());
    }

    #[test]
    fn test_magic_validation() {
        assert!(FileMetadata::new(1, 0, 0).is_valid());
        assert!(!FileMetadata::default().is_valid());

        let mut raw = FileMetadata::new(1, 0, 0).to_bytes().to_vec();
        raw[0] = b'Q';
        assert!(!FileMetadata::from_exact(&raw).unwrap().is_valid());
    }
}
