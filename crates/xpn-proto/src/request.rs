use bytes::{Buf, BufMut, Bytes, BytesMut};
use xpn_types::{ClientTag, DirHandle, FileHandle};

use crate::attr::FileAttr;
use crate::codec::{ensure, WireError, WireStruct};
use crate::metadata::FileMetadata;
use crate::op::OpCode;
use crate::path::WirePath;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Fixed header preceding every request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Raw opcode. Kept undecoded so unknown values can still be logged.
    pub op: u32,
    pub tag: ClientTag,
    pub msg_size: u32,
}

impl WireStruct for EnvelopeHeader {
    const WIRE_SIZE: usize = 12;
    const NAME: &'static str = "EnvelopeHeader";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.op);
        buf.put_i32_le(self.tag.0);
        buf.put_u32_le(self.msg_size);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            op: buf.get_u32_le(),
            tag: ClientTag(buf.get_i32_le()),
            msg_size: buf.get_u32_le(),
        })
    }
}

fn put_session(buf: &mut BytesMut, session: bool, pad: usize) {
    buf.put_u8(session as u8);
    buf.put_bytes(0, pad);
}

fn get_session(buf: &mut &[u8], pad: usize) -> bool {
    let v = buf.get_u8() != 0;
    buf.advance(pad);
    v
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// A request carrying only a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReq {
    pub path: WirePath,
}

impl WireStruct for PathReq {
    const WIRE_SIZE: usize = WirePath::WIRE_SIZE;
    const NAME: &'static str = "PathReq";

    fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            path: WirePath::decode(buf)?,
        })
    }
}

/// Open/creat/mkdir/opendir request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFlagsReq {
    /// `open(2)` flags.
    pub flags: i32,
    pub mode: u32,
    pub session: bool,
    pub path: WirePath,
}

impl WireStruct for PathFlagsReq {
    const WIRE_SIZE: usize = 12 + WirePath::WIRE_SIZE;
    const NAME: &'static str = "PathFlagsReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.flags);
        buf.put_u32_le(self.mode);
        put_session(buf, self.session, 3);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            flags: buf.get_i32_le(),
            mode: buf.get_u32_le(),
            session: get_session(buf, 3),
            path: WirePath::decode(buf)?,
        })
    }
}

/// Read or write range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwReq {
    pub offset: i64,
    pub size: u64,
    pub fd: FileHandle,
    pub session: bool,
    pub path: WirePath,
}

impl WireStruct for RwReq {
    const WIRE_SIZE: usize = 32 + WirePath::WIRE_SIZE;
    const NAME: &'static str = "RwReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.offset);
        buf.put_u64_le(self.size);
        buf.put_i64_le(self.fd.0);
        put_session(buf, self.session, 7);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            offset: buf.get_i64_le(),
            size: buf.get_u64_le(),
            fd: FileHandle(buf.get_i64_le()),
            session: get_session(buf, 7),
            path: WirePath::decode(buf)?,
        })
    }
}

/// Close / closedir request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReq {
    pub fd: FileHandle,
    pub dir: DirHandle,
    pub session: bool,
    pub path: WirePath,
}

impl WireStruct for CloseReq {
    const WIRE_SIZE: usize = 24 + WirePath::WIRE_SIZE;
    const NAME: &'static str = "CloseReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.fd.0);
        buf.put_i64_le(self.dir.0);
        put_session(buf, self.session, 7);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            fd: FileHandle(buf.get_i64_le()),
            dir: DirHandle(buf.get_i64_le()),
            session: get_session(buf, 7),
            path: WirePath::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameReq {
    pub old_path: WirePath,
    pub new_path: WirePath,
}

impl WireStruct for RenameReq {
    const WIRE_SIZE: usize = 2 * WirePath::WIRE_SIZE;
    const NAME: &'static str = "RenameReq";

    fn encode(&self, buf: &mut BytesMut) {
        self.old_path.encode(buf);
        self.new_path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            old_path: WirePath::decode(buf)?,
            new_path: WirePath::decode(buf)?,
        })
    }
}

/// Bits of [`SetAttrReq::valid`].
pub mod setattr_valid {
    pub const MODE: u32 = 1 << 0;
    pub const SIZE: u32 = 1 << 1;
    pub const ATIME: u32 = 1 << 2;
    pub const MTIME: u32 = 1 << 3;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAttrReq {
    /// Which fields of `attr` to apply, see [`setattr_valid`].
    pub valid: u32,
    pub attr: FileAttr,
    pub path: WirePath,
}

impl WireStruct for SetAttrReq {
    const WIRE_SIZE: usize = 8 + FileAttr::WIRE_SIZE + WirePath::WIRE_SIZE;
    const NAME: &'static str = "SetAttrReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.valid);
        buf.put_u32_le(0);
        self.attr.encode(buf);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        let valid = buf.get_u32_le();
        buf.advance(4);
        Ok(Self {
            valid,
            attr: FileAttr::decode(buf)?,
            path: WirePath::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaddirReq {
    /// Position to resume from in stateless mode.
    pub telldir: i64,
    pub dir: DirHandle,
    pub session: bool,
    pub path: WirePath,
}

impl WireStruct for ReaddirReq {
    const WIRE_SIZE: usize = 24 + WirePath::WIRE_SIZE;
    const NAME: &'static str = "ReaddirReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.telldir);
        buf.put_i64_le(self.dir.0);
        put_session(buf, self.session, 7);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            telldir: buf.get_i64_le(),
            dir: DirHandle(buf.get_i64_le()),
            session: get_session(buf, 7),
            path: WirePath::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMdataReq {
    pub mdata: FileMetadata,
    pub path: WirePath,
}

impl WireStruct for WriteMdataReq {
    const WIRE_SIZE: usize = FileMetadata::WIRE_SIZE + WirePath::WIRE_SIZE;
    const NAME: &'static str = "WriteMdataReq";

    fn encode(&self, buf: &mut BytesMut) {
        self.mdata.encode(buf);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            mdata: FileMetadata::decode(buf)?,
            path: WirePath::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMdataFileSizeReq {
    pub size: u64,
    pub path: WirePath,
}

impl WireStruct for WriteMdataFileSizeReq {
    const WIRE_SIZE: usize = 8 + WirePath::WIRE_SIZE;
    const NAME: &'static str = "WriteMdataFileSizeReq";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.size);
        self.path.encode(buf);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_SIZE)?;
        Ok(Self {
            size: buf.get_u64_le(),
            path: WirePath::decode(buf)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Decoded request
// ---------------------------------------------------------------------------

/// A request decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Open(PathFlagsReq),
    Creat(PathFlagsReq),
    Read(RwReq),
    Write(RwReq),
    Close(CloseReq),
    Rm(PathReq),
    RmAsync(PathReq),
    Rename(RenameReq),
    GetAttr(PathReq),
    SetAttr(SetAttrReq),
    Mkdir(PathFlagsReq),
    Rmdir(PathReq),
    RmdirAsync(PathReq),
    Opendir(PathFlagsReq),
    Readdir(ReaddirReq),
    Closedir(CloseReq),
    Statvfs(PathReq),
    ReadMdata(PathReq),
    WriteMdata(WriteMdataReq),
    WriteMdataFileSize(WriteMdataFileSizeReq),
    Finalize,
    Disconnect,
    End,
}

fn empty(op: OpCode, payload: &[u8]) -> Result<(), WireError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(WireError::SizeMismatch {
            what: op.name(),
            expected: 0,
            actual: payload.len(),
        })
    }
}

impl Request {
    /// Decode a payload for the given raw opcode.
    ///
    /// The payload must be exactly the size of the opcode's struct.
    pub fn decode(op: u32, payload: &[u8]) -> Result<Self, WireError> {
        let op = OpCode::try_from(op)?;
        let req = match op {
            OpCode::OpenFile => Request::Open(PathFlagsReq::from_exact(payload)?),
            OpCode::CreatFile => Request::Creat(PathFlagsReq::from_exact(payload)?),
            OpCode::ReadFile => Request::Read(RwReq::from_exact(payload)?),
            OpCode::WriteFile => Request::Write(RwReq::from_exact(payload)?),
            OpCode::CloseFile => Request::Close(CloseReq::from_exact(payload)?),
            OpCode::RmFile => Request::Rm(PathReq::from_exact(payload)?),
            OpCode::RmFileAsync => Request::RmAsync(PathReq::from_exact(payload)?),
            OpCode::RenameFile => Request::Rename(RenameReq::from_exact(payload)?),
            OpCode::GetAttrFile => Request::GetAttr(PathReq::from_exact(payload)?),
            OpCode::SetAttrFile => Request::SetAttr(SetAttrReq::from_exact(payload)?),
            OpCode::MkdirDir => Request::Mkdir(PathFlagsReq::from_exact(payload)?),
            OpCode::RmdirDir => Request::Rmdir(PathReq::from_exact(payload)?),
            OpCode::RmdirDirAsync => Request::RmdirAsync(PathReq::from_exact(payload)?),
            OpCode::OpendirDir => Request::Opendir(PathFlagsReq::from_exact(payload)?),
            OpCode::ReaddirDir => Request::Readdir(ReaddirReq::from_exact(payload)?),
            OpCode::ClosedirDir => Request::Closedir(CloseReq::from_exact(payload)?),
            OpCode::StatvfsDir => Request::Statvfs(PathReq::from_exact(payload)?),
            OpCode::ReadMdata => Request::ReadMdata(PathReq::from_exact(payload)?),
            OpCode::WriteMdata => Request::WriteMdata(WriteMdataReq::from_exact(payload)?),
            OpCode::WriteMdataFileSize => {
                Request::WriteMdataFileSize(WriteMdataFileSizeReq::from_exact(payload)?)
            }
            OpCode::Finalize => {
                empty(op, payload)?;
                Request::Finalize
            }
            OpCode::Disconnect => {
                empty(op, payload)?;
                Request::Disconnect
            }
            OpCode::End => {
                empty(op, payload)?;
                Request::End
            }
        };
        Ok(req)
    }

    pub fn op(&self) -> OpCode {
        match self {
            Request::Open(_) => OpCode::OpenFile,
            Request::Creat(_) => OpCode::CreatFile,
            Request::Read(_) => OpCode::ReadFile,
            Request::Write(_) => OpCode::WriteFile,
            Request::Close(_) => OpCode::CloseFile,
            Request::Rm(_) => OpCode::RmFile,
            Request::RmAsync(_) => OpCode::RmFileAsync,
            Request::Rename(_) => OpCode::RenameFile,
            Request::GetAttr(_) => OpCode::GetAttrFile,
            Request::SetAttr(_) => OpCode::SetAttrFile,
            Request::Mkdir(_) => OpCode::MkdirDir,
            Request::Rmdir(_) => OpCode::RmdirDir,
            Request::RmdirAsync(_) => OpCode::RmdirDirAsync,
            Request::Opendir(_) => OpCode::OpendirDir,
            Request::Readdir(_) => OpCode::ReaddirDir,
            Request::Closedir(_) => OpCode::ClosedirDir,
            Request::Statvfs(_) => OpCode::StatvfsDir,
            Request::ReadMdata(_) => OpCode::ReadMdata,
            Request::WriteMdata(_) => OpCode::WriteMdata,
            Request::WriteMdataFileSize(_) => OpCode::WriteMdataFileSize,
            Request::Finalize => OpCode::Finalize,
            Request::Disconnect => OpCode::Disconnect,
            Request::End => OpCode::End,
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Request::Open(r) | Request::Creat(r) | Request::Mkdir(r) | Request::Opendir(r) => {
                r.encode(buf)
            }
            Request::Read(r) | Request::Write(r) => r.encode(buf),
            Request::Close(r) | Request::Closedir(r) => r.encode(buf),
            Request::Rm(r)
            | Request::RmAsync(r)
            | Request::GetAttr(r)
            | Request::Rmdir(r)
            | Request::RmdirAsync(r)
            | Request::Statvfs(r)
            | Request::ReadMdata(r) => r.encode(buf),
            Request::Rename(r) => r.encode(buf),
            Request::SetAttr(r) => r.encode(buf),
            Request::Readdir(r) => r.encode(buf),
            Request::WriteMdata(r) => r.encode(buf),
            Request::WriteMdataFileSize(r) => r.encode(buf),
            Request::Finalize | Request::Disconnect | Request::End => {}
        }
    }

    /// Encode the envelope header and payload as one frame.
    pub fn to_frame(&self, tag: ClientTag) -> Bytes {
        let mut payload = BytesMut::new();
        self.encode_payload(&mut payload);
        let header = EnvelopeHeader {
            op: self.op().into(),
            tag,
            msg_size: payload.len() as u32,
        };
        let mut frame = BytesMut::with_capacity(EnvelopeHeader::WIRE_SIZE + payload.len());
        header.encode(&mut frame);
        frame.extend_from_slice(&payload);
        frame.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> WirePath {
        WirePath::new(p).unwrap()
    }

    #[test]
    fn test_frame_decodes_back() {
        let req = Request::Read(RwReq {
            offset: 4096,
            size: 10,
            fd: FileHandle::INVALID,
            session: false,
            path: path("/data/a"),
        });
        let frame = req.to_frame(ClientTag(5));
        let mut cur: &[u8] = &frame;
        let header = EnvelopeHeader::decode(&mut cur).unwrap();
        assert_eq!(header.op, OpCode::ReadFile as u32);
        assert_eq!(header.tag, ClientTag(5));
        assert_eq!(header.msg_size as usize, RwReq::WIRE_SIZE);
        assert_eq!(Request::decode(header.op, cur).unwrap(), req);
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let payload = PathReq { path: path("/x") }.to_bytes();
        // A path-only payload is too short for open.
        let err = Request::decode(OpCode::OpenFile as u32, &payload).unwrap_err();
        assert_eq!(
            err,
            WireError::SizeMismatch {
                what: "PathFlagsReq",
                expected: PathFlagsReq::WIRE_SIZE,
                actual: PathReq::WIRE_SIZE,
            }
        );

        let mut long = payload.to_vec();
        long.push(0);
        assert!(matches!(
            Request::decode(OpCode::RmFile as u32, &long),
            Err(WireError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        assert_eq!(Request::decode(99, &[]), Err(WireError::UnknownOpcode(99)));
    }

    #[test]
    fn test_control_ops_have_empty_payload() {
        assert_eq!(Request::decode(OpCode::Disconnect as u32, &[]).unwrap(), Request::Disconnect);
        assert!(Request::decode(OpCode::Finalize as u32, &[1]).is_err());
        let frame = Request::Finalize.to_frame(ClientTag(0));
        assert_eq!(frame.len(), EnvelopeHeader::WIRE_SIZE);
    }

    #[test]
    fn test_session_flag_is_normalised() {
        let mut raw = PathFlagsReq {
            flags: 0,
            mode: 0o644,
            session: true,
            path: path("/f"),
        }
        .to_bytes()
        .to_vec();
        raw[8] = 7;
        let req = PathFlagsReq::from_exact(&raw).unwrap();
        assert!(req.session);
    }
}
