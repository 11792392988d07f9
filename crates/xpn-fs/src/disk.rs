use std::fs::{self, DirBuilder, File, FileTimes, OpenOptions, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::{DirBuilderExt, DirEntryExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use dashmap::DashMap;
use xpn_proto::request::setattr_valid;
use xpn_proto::{DirEntry, FileAttr, FsStats};
use xpn_types::{DirHandle, Errno, FileHandle};

use crate::flags::*;
use crate::path::normalize;
use crate::{Filesystem, FsResult};

/// Snapshot of a directory's entries plus a cursor.
///
/// The snapshot is sorted by name with `.` and `..` first, so positions
/// stay stable across independent `opendir` calls on an unchanged directory.
struct DirStream {
    entries: Vec<DirEntry>,
    pos: usize,
}

/// Backing store on a host directory.
///
/// Request paths are resolved below `root`.
pub struct DiskFilesystem {
    root: PathBuf,
    files: DashMap<i64, Arc<File>>,
    dirs: DashMap<i64, DirStream>,
    next_handle: AtomicI64,
}

impl DiskFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: DashMap::new(),
            dirs: DashMap::new(),
            next_handle: AtomicI64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of descriptors and directory handles currently open.
    pub fn open_handles(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let norm = normalize(path)?;
        Ok(if norm == "/" {
            self.root.clone()
        } else {
            self.root.join(&norm[1..])
        })
    }

    fn alloc_handle(&self) -> i64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn file(&self, fd: FileHandle) -> FsResult<Arc<File>> {
        self.files
            .get(&fd.0)
            .map(|f| Arc::clone(f.value()))
            .ok_or(Errno::EBADF)
    }
}

fn attr_from_metadata(md: &fs::Metadata) -> FileAttr {
    FileAttr {
        ino: md.ino(),
        mode: md.mode(),
        nlink: md.nlink() as u32,
        uid: md.uid(),
        gid: md.gid(),
        size: md.size(),
        blksize: md.blksize(),
        blocks: md.blocks(),
        atime: md.atime(),
        mtime: md.mtime(),
        ctime: md.ctime(),
    }
}

fn dirent_kind(ft: fs::FileType) -> u8 {
    if ft.is_dir() {
        DirEntry::DT_DIR
    } else if ft.is_file() {
        DirEntry::DT_REG
    } else if ft.is_symlink() {
        DirEntry::DT_LNK
    } else {
        DirEntry::DT_UNKNOWN
    }
}

fn epoch_plus(secs: i64) -> std::time::SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

impl Filesystem for DiskFilesystem {
    fn open(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileHandle> {
        let resolved = self.resolve(path)?;
        let mut opts = OpenOptions::new();
        match flags & O_ACCMODE {
            O_RDONLY => {
                opts.read(true);
            }
            O_WRONLY => {
                opts.write(true);
            }
            O_RDWR => {
                opts.read(true).write(true);
            }
            _ => return Err(Errno::EINVAL),
        }
        if flags & O_APPEND != 0 {
            opts.append(true);
        }
        if flags & O_CREAT != 0 {
            if flags & O_EXCL != 0 {
                opts.create_new(true);
            } else {
                opts.create(true);
            }
        }
        if flags & O_TRUNC != 0 {
            opts.truncate(true);
        }
        opts.mode(mode);
        opts.custom_flags(flags & !(O_ACCMODE | O_CREAT | O_EXCL | O_TRUNC | O_APPEND));

        let file = opts.open(&resolved)?;
        let fd = self.alloc_handle();
        self.files.insert(fd, Arc::new(file));
        tracing::trace!(path, fd, "disk open");
        Ok(FileHandle(fd))
    }

    fn close(&self, fd: FileHandle) -> FsResult<()> {
        self.files.remove(&fd.0).map(|_| ()).ok_or(Errno::EBADF)
    }

    fn fsync(&self, fd: FileHandle) -> FsResult<()> {
        Ok(self.file(fd)?.sync_all()?)
    }

    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let file = self.file(fd)?;
        Ok((&*file).read(buf)?)
    }

    fn write(&self, fd: FileHandle, buf: &[u8]) -> FsResult<usize> {
        let file = self.file(fd)?;
        Ok((&*file).write(buf)?)
    }

    fn pread(&self, fd: FileHandle, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        Ok(self.file(fd)?.read_at(buf, offset)?)
    }

    fn pwrite(&self, fd: FileHandle, buf: &[u8], offset: u64) -> FsResult<usize> {
        Ok(self.file(fd)?.write_at(buf, offset)?)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        Ok(fs::remove_file(self.resolve(path)?)?)
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        Ok(fs::rename(self.resolve(old_path)?, self.resolve(new_path)?)?)
    }

    fn stat(&self, path: &str) -> FsResult<FileAttr> {
        let md = fs::metadata(self.resolve(path)?)?;
        Ok(attr_from_metadata(&md))
    }

    fn setattr(&self, path: &str, attr: &FileAttr, valid: u32) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        if valid & setattr_valid::MODE != 0 {
            fs::set_permissions(&resolved, Permissions::from_mode(attr.permissions()))?;
        }
        if valid & setattr_valid::SIZE != 0 {
            OpenOptions::new()
                .write(true)
                .open(&resolved)?
                .set_len(attr.size)?;
        }
        if valid & (setattr_valid::ATIME | setattr_valid::MTIME) != 0 {
            let mut times = FileTimes::new();
            if valid & setattr_valid::ATIME != 0 {
                times = times.set_accessed(epoch_plus(attr.atime));
            }
            if valid & setattr_valid::MTIME != 0 {
                times = times.set_modified(epoch_plus(attr.mtime));
            }
            File::open(&resolved)?.set_times(times)?;
        }
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        Ok(DirBuilder::new().mode(mode).create(self.resolve(path)?)?)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        Ok(fs::remove_dir(self.resolve(path)?)?)
    }

    fn opendir(&self, path: &str) -> FsResult<DirHandle> {
        let resolved = self.resolve(path)?;
        let here = fs::metadata(&resolved)?;
        let up = resolved
            .parent()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.ino())
            .unwrap_or_else(|| here.ino());

        let mut names = Vec::new();
        for entry in fs::read_dir(&resolved)? {
            let entry = entry?;
            let kind = entry
                .file_type()
                .map(dirent_kind)
                .unwrap_or(DirEntry::DT_UNKNOWN);
            names.push(DirEntry {
                ino: entry.ino(),
                kind,
                name: entry.file_name().to_string_lossy().into_owned(),
            });
        }
        names.sort_by(|a, b| a.name.cmp(&b.name));

        let mut entries = Vec::with_capacity(names.len() + 2);
        entries.push(DirEntry {
            ino: here.ino(),
            kind: DirEntry::DT_DIR,
            name: ".".into(),
        });
        entries.push(DirEntry {
            ino: up,
            kind: DirEntry::DT_DIR,
            name: "..".into(),
        });
        entries.extend(names);

        let dir = self.alloc_handle();
        self.dirs.insert(dir, DirStream { entries, pos: 0 });
        Ok(DirHandle(dir))
    }

    fn readdir(&self, dir: DirHandle) -> FsResult<Option<DirEntry>> {
        let mut stream = self.dirs.get_mut(&dir.0).ok_or(Errno::EBADF)?;
        let entry = stream.entries.get(stream.pos).cloned();
        if entry.is_some() {
            stream.pos += 1;
        }
        Ok(entry)
    }

    fn telldir(&self, dir: DirHandle) -> FsResult<i64> {
        let stream = self.dirs.get(&dir.0).ok_or(Errno::EBADF)?;
        Ok(stream.pos as i64)
    }

    fn seekdir(&self, dir: DirHandle, pos: i64) -> FsResult<()> {
        if pos < 0 {
            return Err(Errno::EINVAL);
        }
        let mut stream = self.dirs.get_mut(&dir.0).ok_or(Errno::EBADF)?;
        stream.pos = (pos as usize).min(stream.entries.len());
        Ok(())
    }

    fn closedir(&self, dir: DirHandle) -> FsResult<()> {
        self.dirs.remove(&dir.0).map(|_| ()).ok_or(Errno::EBADF)
    }

    fn statvfs(&self, path: &str) -> FsResult<FsStats> {
        let resolved = self.resolve(path)?;
        let st = nix::sys::statvfs::statvfs(resolved.as_path()).map_err(|e| Errno(e as i32))?;
        Ok(FsStats {
            bsize: st.block_size() as u64,
            frsize: st.fragment_size() as u64,
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            files: st.files() as u64,
            ffree: st.files_free() as u64,
            favail: st.files_available() as u64,
            fsid: st.filesystem_id() as u64,
            flag: st.flags().bits() as u64,
            namemax: st.name_max() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, DiskFilesystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = DiskFilesystem::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn test_create_write_read() {
        let (_tmp, fs) = setup();
        let fd = fs.open("/f", O_RDWR | O_CREAT, 0o644).unwrap();
        assert_eq!(fs.pwrite(fd, b"hello", 3).unwrap(), 5);
        let mut buf = [0u8; 8];
        assert_eq!(fs.pread(fd, &mut buf, 0).unwrap(), 8);
        assert_eq!(&buf, b"\0\0\0hello");
        fs.fsync(fd).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.close(fd), Err(Errno::EBADF));
        assert_eq!(fs.stat("/f").unwrap().size, 8);
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_cursor_read_write() {
        let (_tmp, fs) = setup();
        let fd = fs.creat("/c", 0o600).unwrap();
        fs.write(fd, b"ab").unwrap();
        fs.write(fd, b"cd").unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("/c", O_RDONLY, 0).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        fs.close(fd).unwrap();
    }

    #[test]
    fn test_open_directory_for_write_is_eisdir() {
        let (_tmp, fs) = setup();
        fs.mkdir("/d", 0o755).unwrap();
        assert_eq!(fs.open("/d", O_RDWR, 0), Err(Errno::EISDIR));
        assert_eq!(fs.open("/missing", O_RDONLY, 0), Err(Errno::ENOENT));
    }

    #[test]
    fn test_path_escape_rejected() {
        let (_tmp, fs) = setup();
        assert_eq!(fs.stat("/../etc/passwd"), Err(Errno::EACCES));
    }

    #[test]
    fn test_readdir_resume_by_position() {
        let (_tmp, fs) = setup();
        fs.mkdir("/d", 0o755).unwrap();
        for name in ["b", "a", "c"] {
            let fd = fs.creat(&format!("/d/{}", name), 0o644).unwrap();
            fs.close(fd).unwrap();
        }

        let dir = fs.opendir("/d").unwrap();
        let mut all = Vec::new();
        while let Some(e) = fs.readdir(dir).unwrap() {
            all.push(e.name);
        }
        fs.closedir(dir).unwrap();
        assert_eq!(all, vec![".", "..", "a", "b", "c"]);

        let mut pos = 0;
        let mut resumed = Vec::new();
        loop {
            let dir = fs.opendir("/d").unwrap();
            fs.seekdir(dir, pos).unwrap();
            let entry = fs.readdir(dir).unwrap();
            pos = fs.telldir(dir).unwrap();
            fs.closedir(dir).unwrap();
            match entry {
                Some(e) => resumed.push(e.name),
                None => break,
            }
        }
        assert_eq!(resumed, all);
    }

    #[test]
    fn test_setattr_size_and_mode() {
        let (_tmp, fs) = setup();
        let fd = fs.creat("/s", 0o644).unwrap();
        fs.pwrite(fd, &[1u8; 100], 0).unwrap();
        fs.close(fd).unwrap();

        let attr = FileAttr {
            mode: 0o600,
            size: 10,
            mtime: 1_000_000,
            ..Default::default()
        };
        fs.setattr(
            "/s",
            &attr,
            setattr_valid::MODE | setattr_valid::SIZE | setattr_valid::MTIME,
        )
        .unwrap();
        let st = fs.stat("/s").unwrap();
        assert_eq!(st.size, 10);
        assert_eq!(st.permissions(), 0o600);
        assert_eq!(st.mtime, 1_000_000);
    }

    #[test]
    fn test_rename_unlink_rmdir() {
        let (_tmp, fs) = setup();
        let fd = fs.creat("/x", 0o644).unwrap();
        fs.close(fd).unwrap();
        fs.rename("/x", "/y").unwrap();
        assert_eq!(fs.stat("/x"), Err(Errno::ENOENT));
        fs.unlink("/y").unwrap();

        fs.mkdir("/d", 0o755).unwrap();
        let fd = fs.creat("/d/f", 0o644).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.rmdir("/d"), Err(Errno::ENOTEMPTY));
        fs.unlink("/d/f").unwrap();
        fs.rmdir("/d").unwrap();
    }

    #[test]
    fn test_statvfs() {
        let (_tmp, fs) = setup();
        let st = fs.statvfs("/").unwrap();
        assert!(st.bsize > 0);
        assert!(st.blocks > 0);
    }
}
