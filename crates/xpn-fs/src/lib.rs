//! Backing-store abstraction used by the file server.
//!
//! Every call returns its result together with the OS error it produced, so
//! handlers never consult a thread-global errno. Descriptors and directory
//! handles are plain integers owned by the backend's handle table.

pub mod disk;
pub mod mem;
pub mod path;

use xpn_proto::{DirEntry, FileAttr, FsStats};
use xpn_types::{DirHandle, Errno, FileHandle};

pub use disk::DiskFilesystem;
pub use mem::{MemFilesystem, OpCounters};

pub type FsResult<T> = Result<T, Errno>;

/// `open(2)` flag values understood by every backend.
pub mod flags {
    pub const O_RDONLY: i32 = libc::O_RDONLY;
    pub const O_WRONLY: i32 = libc::O_WRONLY;
    pub const O_RDWR: i32 = libc::O_RDWR;
    pub const O_ACCMODE: i32 = libc::O_ACCMODE;
    pub const O_CREAT: i32 = libc::O_CREAT;
    pub const O_EXCL: i32 = libc::O_EXCL;
    pub const O_TRUNC: i32 = libc::O_TRUNC;
    pub const O_APPEND: i32 = libc::O_APPEND;
}

/// A transfer that stopped on an error after moving `done` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialIo {
    pub done: usize,
    pub errno: Errno,
}

/// POSIX-like file and directory primitives.
///
/// `pread`/`pwrite`/`read`/`write` may transfer fewer bytes than asked; the
/// `*_full` helpers loop until the buffer is done, a zero-length transfer
/// occurs, or an error is returned.
pub trait Filesystem: Send + Sync + 'static {
    fn open(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileHandle>;

    fn creat(&self, path: &str, mode: u32) -> FsResult<FileHandle> {
        self.open(
            path,
            flags::O_WRONLY | flags::O_CREAT | flags::O_TRUNC,
            mode,
        )
    }

    fn close(&self, fd: FileHandle) -> FsResult<()>;

    fn fsync(&self, fd: FileHandle) -> FsResult<()>;

    /// Read at the descriptor's current position and advance it.
    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> FsResult<usize>;

    /// Write at the descriptor's current position and advance it.
    fn write(&self, fd: FileHandle, buf: &[u8]) -> FsResult<usize>;

    fn pread(&self, fd: FileHandle, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    fn pwrite(&self, fd: FileHandle, buf: &[u8], offset: u64) -> FsResult<usize>;

    fn unlink(&self, path: &str) -> FsResult<()>;

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()>;

    fn stat(&self, path: &str) -> FsResult<FileAttr>;

    /// Apply the fields of `attr` selected by `valid`
    /// (see `xpn_proto::request::setattr_valid`).
    fn setattr(&self, path: &str, attr: &FileAttr, valid: u32) -> FsResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    fn rmdir(&self, path: &str) -> FsResult<()>;

    fn opendir(&self, path: &str) -> FsResult<DirHandle>;

    /// Next entry, or `None` at the end of the directory.
    fn readdir(&self, dir: DirHandle) -> FsResult<Option<DirEntry>>;

    fn telldir(&self, dir: DirHandle) -> FsResult<i64>;

    fn seekdir(&self, dir: DirHandle, pos: i64) -> FsResult<()>;

    fn closedir(&self, dir: DirHandle) -> FsResult<()>;

    fn statvfs(&self, path: &str) -> FsResult<FsStats>;

    /// `pread` until `buf` is full or end of file.
    fn pread_full(&self, fd: FileHandle, buf: &mut [u8], offset: u64) -> Result<usize, PartialIo> {
        let mut done = 0;
        while done < buf.len() {
            match self.pread(fd, &mut buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(errno) => return Err(PartialIo { done, errno }),
            }
        }
        Ok(done)
    }

    /// `pwrite` until all of `buf` is written or a write returns zero.
    fn pwrite_full(&self, fd: FileHandle, buf: &[u8], offset: u64) -> Result<usize, PartialIo> {
        let mut done = 0;
        while done < buf.len() {
            match self.pwrite(fd, &buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(errno) => return Err(PartialIo { done, errno }),
            }
        }
        Ok(done)
    }

    /// `read` until `buf` is full or end of file.
    fn read_full(&self, fd: FileHandle, buf: &mut [u8]) -> Result<usize, PartialIo> {
        let mut done = 0;
        while done < buf.len() {
            match self.read(fd, &mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(errno) => return Err(PartialIo { done, errno }),
            }
        }
        Ok(done)
    }

    /// `write` until all of `buf` is written or a write returns zero.
    fn write_full(&self, fd: FileHandle, buf: &[u8]) -> Result<usize, PartialIo> {
        let mut done = 0;
        while done < buf.len() {
            match self.write(fd, &buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(errno) => return Err(PartialIo { done, errno }),
            }
        }
        Ok(done)
    }
}
