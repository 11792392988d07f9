use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{ensure, get_fixed_str, put_fixed_str, WireError, WireStruct};
use crate::NAME_MAX;

/// File attributes as returned by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttr {
    pub ino: u64,
    /// File type and permission bits, `st_mode` layout.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileAttr {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;

    pub fn is_dir(&self) -> bool {
        self.mode & Self::S_IFMT == Self::S_IFDIR
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

impl WireStruct for FileAttr {
    const WIRE_SIZE: usize = 72;
    const NAME: &'static str = "FileAttr";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.ino);
        buf.put_u32_le(self.mode);
        buf.put_u32_le(self.nlink);
        buf.put_u32_le(self.uid);
        buf.put_u32_le(self.gid);
        buf.put_u64_le(self.size);
        buf.put_u64_le(self.blksize);
        buf.put_u64_le(self.blocks);
        buf.put_i64_le(self.atime);
        buf.put_i64_le(self.mtime);
        buf.put_i64_le(self.ctime);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            ino: buf.get_u64_le(),
            mode: buf.get_u32_le(),
            nlink: buf.get_u32_le(),
            uid: buf.get_u32_le(),
            gid: buf.get_u32_le(),
            size: buf.get_u64_le(),
            blksize: buf.get_u64_le(),
            blocks: buf.get_u64_le(),
            atime: buf.get_i64_le(),
            mtime: buf.get_i64_le(),
            ctime: buf.get_i64_le(),
        })
    }
}

/// Filesystem statistics as returned by `statvfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsStats {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}

impl WireStruct for FsStats {
    const WIRE_SIZE: usize = 88;
    const NAME: &'static str = "FsStats";

    fn encode(&self, buf: &mut BytesMut) {
        for v in [
            self.bsize,
            self.frsize,
            self.blocks,
            self.bfree,
            self.bavail,
            self.files,
            self.ffree,
            self.favail,
            self.fsid,
            self.flag,
            self.namemax,
        ] {
            buf.put_u64_le(v);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            bsize: buf.get_u64_le(),
            frsize: buf.get_u64_le(),
            blocks: buf.get_u64_le(),
            bfree: buf.get_u64_le(),
            bavail: buf.get_u64_le(),
            files: buf.get_u64_le(),
            ffree: buf.get_u64_le(),
            favail: buf.get_u64_le(),
            fsid: buf.get_u64_le(),
            flag: buf.get_u64_le(),
            namemax: buf.get_u64_le(),
        })
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub ino: u64,
    /// `d_type` value (`DT_DIR`, `DT_REG`, ...).
    pub kind: u8,
    pub name: String,
}

impl DirEntry {
    pub const DT_UNKNOWN: u8 = 0;
    pub const DT_DIR: u8 = 4;
    pub const DT_REG: u8 = 8;
    pub const DT_LNK: u8 = 10;
}

impl WireStruct for DirEntry {
    const WIRE_SIZE: usize = 8 + 4 + 4 + NAME_MAX;
    const NAME: &'static str = "DirEntry";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.ino);
        buf.put_u8(self.kind);
        buf.put_bytes(0, 3);
        put_fixed_str(buf, &self.name, NAME_MAX);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let ino = buf.get_u64_le();
        let kind = buf.get_u8();
        buf.advance(3);
        let name = get_fixed_str(buf, NAME_MAX)?;
        Ok(Self { ino, kind, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_mode_helpers() {
        let attr = FileAttr {
            mode: FileAttr::S_IFDIR | 0o755,
            ..Default::default()
        };
        assert!(attr.is_dir());
        assert_eq!(attr.permissions(), 0o755);
    }

    #[test]
    fn test_dirent_decode_short_buffer() {
        let raw = [0u8; 10];
        assert!(matches!(
            DirEntry::from_exact(&raw),
            Err(WireError::SizeMismatch { what: "DirEntry", .. })
        ));
    }

    #[test]
    fn test_dirent_name_roundtrip() {
        let entry = DirEntry {
            ino: 42,
            kind: DirEntry::DT_REG,
            name: "chunk.0001".into(),
        };
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DirEntry::WIRE_SIZE);
        assert_eq!(DirEntry::from_exact(&bytes).unwrap(), entry);
    }
}
