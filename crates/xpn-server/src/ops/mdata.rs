use xpn_fs::flags::{O_CREAT, O_RDWR, O_WRONLY};
use xpn_fs::{Filesystem, FsResult};
use xpn_net::{Comm, NetError};
use xpn_proto::{
    FileMetadata, PathReq, ReadMdataReply, StatusReply, WireStruct, WriteMdataFileSizeReq,
    WriteMdataReq,
};
use xpn_types::Errno;

use super::{Dispatcher, Reply};

/// Raise the size stored in `path`'s metadata record to `size`.
///
/// The record is left alone when it is shorter than a size field, when it
/// already holds a larger value, or when `path` is a directory.
pub fn persist_file_size(fs: &dyn Filesystem, path: &str, size: u64) -> FsResult<()> {
    let fd = match fs.open(path, O_RDWR, 0) {
        Ok(fd) => fd,
        Err(Errno::EISDIR) => return Ok(()),
        Err(errno) => return Err(errno),
    };

    let res = (|| -> FsResult<()> {
        let mut current = [0u8; 8];
        let n = fs
            .pread_full(fd, &mut current, FileMetadata::FILE_SIZE_OFFSET)
            .map_err(|p| p.errno)?;
        if n < current.len() || u64::from_le_bytes(current) >= size {
            return Ok(());
        }
        fs.pwrite_full(fd, &size.to_le_bytes(), FileMetadata::FILE_SIZE_OFFSET)
            .map_err(|p| p.errno)?;
        Ok(())
    })();

    let closed = fs.close(fd);
    res?;
    closed
}

impl Dispatcher {
    /// Directories carry no record: they answer `ret = 0` with a zeroed one.
    pub(crate) async fn read_mdata<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathReq,
    ) -> Result<(), NetError> {
        let path = req.path.as_str();
        let rsp = match self.fs.open(path, O_RDWR, 0) {
            Ok(fd) => {
                let mut raw = [0u8; FileMetadata::WIRE_SIZE];
                let read = self.fs.pread_full(fd, &mut raw, 0);
                if let Err(errno) = self.fs.close(fd) {
                    tracing::debug!(%path, %errno, "close after read_mdata failed");
                }
                match read {
                    Ok(n) => {
                        let mdata = FileMetadata::from_exact(&raw)
                            .ok()
                            .filter(FileMetadata::is_valid)
                            .unwrap_or_default();
                        ReadMdataReply {
                            mdata,
                            status: StatusReply::ok(n as i64),
                        }
                    }
                    Err(partial) => ReadMdataReply {
                        mdata: FileMetadata::default(),
                        status: StatusReply::err(partial.errno),
                    },
                }
            }
            Err(Errno::EISDIR) => ReadMdataReply {
                mdata: FileMetadata::default(),
                status: StatusReply::ok(0),
            },
            Err(errno) => ReadMdataReply {
                mdata: FileMetadata::default(),
                status: StatusReply::err(errno),
            },
        };
        tracing::debug!(%path, ret = rsp.status.ret, "read_mdata");
        reply.send(&rsp).await
    }

    pub(crate) async fn write_mdata<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: WriteMdataReq,
    ) -> Result<(), NetError> {
        let path = req.path.as_str();
        let status = match self.fs.open(path, O_WRONLY | O_CREAT, 0o700) {
            Ok(fd) => {
                let res = self.fs.pwrite_full(fd, &req.mdata.to_bytes(), 0);
                let closed = self.fs.close(fd);
                match (res, closed) {
                    (Err(partial), _) => StatusReply::err(partial.errno),
                    // A failed close can be the only sign the record never
                    // reached the store.
                    (Ok(_), Err(errno)) => {
                        tracing::warn!(%path, %errno, "close after write_mdata failed");
                        StatusReply::err(errno)
                    }
                    (Ok(n), Ok(())) => StatusReply::ok(n as i64),
                }
            }
            Err(Errno::EISDIR) => StatusReply::ok(0),
            Err(errno) => StatusReply::err(errno),
        };
        tracing::debug!(%path, ret = status.ret, "write_mdata");
        reply.send(&status).await
    }

    /// No reply is sent; the client does not wait for this one.
    pub(crate) fn write_mdata_file_size(&self, req: WriteMdataFileSizeReq) {
        let path = req.path.as_str();
        let fs = self.fs.as_ref();
        let res = self
            .md_queue
            .update(path, req.size, |size| persist_file_size(fs, path, size));
        match res {
            Ok(()) => tracing::debug!(%path, size = req.size, "write_mdata_file_size"),
            Err(errno) => {
                tracing::warn!(%path, size = req.size, %errno, "write_mdata_file_size failed")
            }
        }
    }
}
