use std::collections::HashSet;

use xpn_fs::Filesystem;
use xpn_types::{DirHandle, FileHandle};

/// Handles one connection opened in session mode.
///
/// A session handle may only be used by the connection that created it.
/// Whatever is still open when the connection ends is closed by
/// [`ConnectionSession::close_all`].
#[derive(Debug, Default)]
pub struct ConnectionSession {
    files: HashSet<FileHandle>,
    dirs: HashSet<DirHandle>,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_file(&mut self, fd: FileHandle) {
        self.files.insert(fd);
    }

    pub fn owns_file(&self, fd: FileHandle) -> bool {
        self.files.contains(&fd)
    }

    /// Stop tracking `fd`. Returns false if this connection never opened it.
    pub fn forget_file(&mut self, fd: FileHandle) -> bool {
        self.files.remove(&fd)
    }

    pub fn track_dir(&mut self, dir: DirHandle) {
        self.dirs.insert(dir);
    }

    pub fn owns_dir(&self, dir: DirHandle) -> bool {
        self.dirs.contains(&dir)
    }

    pub fn forget_dir(&mut self, dir: DirHandle) -> bool {
        self.dirs.remove(&dir)
    }

    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    pub fn open_dirs(&self) -> usize {
        self.dirs.len()
    }

    /// Close every handle still owned. Returns how many were closed.
    pub fn close_all<F: Filesystem + ?Sized>(&mut self, fs: &F) -> usize {
        let mut closed = 0;
        for fd in self.files.drain() {
            match fs.close(fd) {
                Ok(()) => closed += 1,
                Err(errno) => tracing::warn!(%fd, %errno, "closing leftover descriptor failed"),
            }
        }
        for dir in self.dirs.drain() {
            match fs.closedir(dir) {
                Ok(()) => closed += 1,
                Err(errno) => tracing::warn!(%dir, %errno, "closing leftover directory failed"),
            }
        }
        closed
    }
}
