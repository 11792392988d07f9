use bytes::{Buf, BufMut, BytesMut};
use xpn_types::{DirHandle, Errno};

use crate::attr::{DirEntry, FileAttr, FsStats};
use crate::codec::{ensure, WireError, WireStruct};
use crate::metadata::FileMetadata;

/// Return code plus the OS error captured by the backing store.
///
/// `ret < 0` means failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusReply {
    pub ret: i64,
    pub server_errno: Errno,
}

impl StatusReply {
    pub fn ok(ret: i64) -> Self {
        Self {
            ret,
            server_errno: Errno::NONE,
        }
    }

    pub fn err(errno: Errno) -> Self {
        Self {
            ret: -1,
            server_errno: errno,
        }
    }

    pub fn from_result(res: Result<i64, Errno>) -> Self {
        match res {
            Ok(ret) => Self::ok(ret),
            Err(errno) => Self::err(errno),
        }
    }

    pub fn is_err(&self) -> bool {
        self.ret < 0
    }
}

impl WireStruct for StatusReply {
    const WIRE_SIZE: usize = 16;
    const NAME: &'static str = "StatusReply";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.ret);
        buf.put_i32_le(self.server_errno.raw());
        buf.put_u32_le(0);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let ret = buf.get_i64_le();
        let server_errno = Errno(buf.get_i32_le());
        buf.advance(4);
        Ok(Self { ret, server_errno })
    }
}

/// Header sent for every read window and once at the end of a write.
///
/// `size == -1` reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwReply {
    pub size: i64,
    pub last: bool,
    pub status: StatusReply,
}

impl WireStruct for RwReply {
    const WIRE_SIZE: usize = 16 + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "RwReply";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.size);
        buf.put_u8(self.last as u8);
        buf.put_bytes(0, 7);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let size = buf.get_i64_le();
        let last = buf.get_u8() != 0;
        buf.advance(7);
        Ok(Self {
            size,
            last,
            status: StatusReply::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrReply {
    pub attr: FileAttr,
    pub status: StatusReply,
}

impl WireStruct for AttrReply {
    const WIRE_SIZE: usize = FileAttr::WIRE_SIZE + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "AttrReply";

    fn encode(&self, buf: &mut BytesMut) {
        self.attr.encode(buf);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            attr: FileAttr::decode(buf)?,
            status: StatusReply::decode(buf)?,
        })
    }
}

/// In session mode `dir` is a live handle; otherwise `status.ret` holds the
/// starting position for stateless iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpendirReply {
    pub dir: DirHandle,
    pub status: StatusReply,
}

impl WireStruct for OpendirReply {
    const WIRE_SIZE: usize = 8 + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "OpendirReply";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.dir.0);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            dir: DirHandle(buf.get_i64_le()),
            status: StatusReply::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReaddirReply {
    /// True when `entry` holds a directory entry.
    pub has_entry: bool,
    pub entry: DirEntry,
    /// Position after this entry, for the next stateless call.
    pub telldir: i64,
    pub status: StatusReply,
}

impl WireStruct for ReaddirReply {
    const WIRE_SIZE: usize = 8 + DirEntry::WIRE_SIZE + 8 + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "ReaddirReply";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.has_entry as i32);
        buf.put_u32_le(0);
        self.entry.encode(buf);
        buf.put_i64_le(self.telldir);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let has_entry = buf.get_i32_le() == 1;
        buf.advance(4);
        let entry = DirEntry::decode(buf)?;
        Ok(Self {
            has_entry,
            entry,
            telldir: buf.get_i64_le(),
            status: StatusReply::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatvfsReply {
    pub stats: FsStats,
    pub status: StatusReply,
}

impl WireStruct for StatvfsReply {
    const WIRE_SIZE: usize = FsStats::WIRE_SIZE + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "StatvfsReply";

    fn encode(&self, buf: &mut BytesMut) {
        self.stats.encode(buf);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            stats: FsStats::decode(buf)?,
            status: StatusReply::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadMdataReply {
    pub mdata: FileMetadata,
    pub status: StatusReply,
}

impl WireStruct for ReadMdataReply {
    const WIRE_SIZE: usize = FileMetadata::WIRE_SIZE + StatusReply::WIRE_SIZE;
    const NAME: &'static str = "ReadMdataReply";

    fn encode(&self, buf: &mut BytesMut) {
        self.mdata.encode(buf);
        self.status.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            mdata: FileMetadata::decode(buf)?,
            status: StatusReply::decode(buf)?,
        })
    }
}
