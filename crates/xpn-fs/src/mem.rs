use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use xpn_proto::request::setattr_valid;
use xpn_proto::{DirEntry, FileAttr, FsStats, NAME_MAX};
use xpn_types::{DirHandle, Errno, FileHandle};

use crate::flags::*;
use crate::path::{file_name, normalize, parent};
use crate::{Filesystem, FsResult};

const BLOCK_SIZE: u64 = 4096;
const TOTAL_BLOCKS: u64 = 1 << 20;

/// Snapshot of backend call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub opens: u64,
    pub closes: u64,
    pub reads: u64,
    pub writes: u64,
    pub preads: u64,
    pub pwrites: u64,
    pub fsyncs: u64,
    pub opendirs: u64,
    pub closedirs: u64,
}

#[derive(Default)]
struct Counters {
    opens: AtomicU64,
    closes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    preads: AtomicU64,
    pwrites: AtomicU64,
    fsyncs: AtomicU64,
    opendirs: AtomicU64,
    closedirs: AtomicU64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct MemFile {
    ino: u64,
    mode: u32,
    data: Vec<u8>,
    atime: i64,
    mtime: i64,
    ctime: i64,
}

impl MemFile {
    fn attr(&self) -> FileAttr {
        FileAttr {
            ino: self.ino,
            mode: FileAttr::S_IFREG | (self.mode & 0o7777),
            nlink: 1,
            uid: 0,
            gid: 0,
            size: self.data.len() as u64,
            blksize: BLOCK_SIZE,
            blocks: (self.data.len() as u64).div_ceil(512),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}

type FileRef = Arc<Mutex<MemFile>>;

enum Node {
    File(FileRef),
    Dir { ino: u64, mode: u32, mtime: i64 },
}

struct OpenFile {
    file: FileRef,
    access: i32,
    append: bool,
    pos: u64,
}

impl OpenFile {
    fn readable(&self) -> bool {
        self.access == O_RDONLY || self.access == O_RDWR
    }

    fn writable(&self) -> bool {
        self.access == O_WRONLY || self.access == O_RDWR
    }
}

struct DirStream {
    entries: Vec<DirEntry>,
    pos: usize,
}

struct Namespace {
    nodes: BTreeMap<String, Node>,
    next_ino: u64,
}

impl Namespace {
    fn alloc_ino(&mut self) -> u64 {
        self.next_ino += 1;
        self.next_ino
    }

    fn require_dir(&self, path: &str) -> FsResult<()> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File(_)) => Err(Errno::ENOTDIR),
            None => Err(Errno::ENOENT),
        }
    }

    fn require_parent(&self, path: &str) -> FsResult<()> {
        match parent(path) {
            Some(p) => self.require_dir(p),
            None => Err(Errno::EEXIST),
        }
    }

    /// Direct children of `dir`, in name order.
    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.len() > 1)
            .filter_map(move |(k, v)| {
                let rest = &k[k.rfind('/').map(|i| i + 1).unwrap_or(0)..];
                let depth_ok = parent(k).map(|p| p == dir).unwrap_or(false);
                depth_ok.then_some((rest, v))
            })
    }
}

/// In-process backing store.
///
/// Keeps the whole namespace in memory and counts every backend call, which
/// makes descriptor lifecycles observable. Partial transfers, disk-full
/// conditions and failing closes can be simulated with
/// [`with_max_io_chunk`], [`set_write_budget`] and [`set_close_error`].
///
/// [`with_max_io_chunk`]: MemFilesystem::with_max_io_chunk
/// [`set_write_budget`]: MemFilesystem::set_write_budget
/// [`set_close_error`]: MemFilesystem::set_close_error
pub struct MemFilesystem {
    ns: Mutex<Namespace>,
    files: DashMap<i64, OpenFile>,
    dirs: DashMap<i64, DirStream>,
    next_handle: AtomicI64,
    counters: Counters,
    max_io_chunk: Option<usize>,
    write_budget: Mutex<Option<usize>>,
    close_error: Mutex<Option<Errno>>,
}

impl Default for MemFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFilesystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Dir {
                ino: 1,
                mode: 0o755,
                mtime: now_secs(),
            },
        );
        Self {
            ns: Mutex::new(Namespace { nodes, next_ino: 1 }),
            files: DashMap::new(),
            dirs: DashMap::new(),
            next_handle: AtomicI64::new(0),
            counters: Counters::default(),
            max_io_chunk: None,
            write_budget: Mutex::new(None),
            close_error: Mutex::new(None),
        }
    }

    /// Cap every single read or write at `chunk` bytes.
    pub fn with_max_io_chunk(mut self, chunk: usize) -> Self {
        self.max_io_chunk = Some(chunk.max(1));
        self
    }

    /// Allow only `budget` more bytes to be written, then fail with `ENOSPC`.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        *self.write_budget.lock() = budget;
    }

    /// Make every file close fail with `errno`. The handle is still released.
    pub fn set_close_error(&self, errno: Option<Errno>) {
        *self.close_error.lock() = errno;
    }

    pub fn counters(&self) -> OpCounters {
        let c = &self.counters;
        OpCounters {
            opens: c.opens.load(Ordering::Relaxed),
            closes: c.closes.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            preads: c.preads.load(Ordering::Relaxed),
            pwrites: c.pwrites.load(Ordering::Relaxed),
            fsyncs: c.fsyncs.load(Ordering::Relaxed),
            opendirs: c.opendirs.load(Ordering::Relaxed),
            closedirs: c.closedirs.load(Ordering::Relaxed),
        }
    }

    /// Number of descriptors and directory handles currently open.
    pub fn open_handles(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    /// Whole contents of a file, for assertions.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path).ok()?;
        match self.ns.lock().nodes.get(&path) {
            Some(Node::File(f)) => Some(f.lock().data.clone()),
            _ => None,
        }
    }

    fn alloc_handle(&self) -> i64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn clamp(&self, len: usize) -> usize {
        match self.max_io_chunk {
            Some(chunk) => len.min(chunk),
            None => len,
        }
    }

    /// Reserve up to `len` bytes of the write budget.
    fn take_budget(&self, len: usize) -> FsResult<usize> {
        let mut budget = self.write_budget.lock();
        match budget.as_mut() {
            None => Ok(len),
            Some(0) if len > 0 => Err(Errno::ENOSPC),
            Some(left) => {
                let n = len.min(*left);
                *left -= n;
                Ok(n)
            }
        }
    }

    fn read_at(&self, file: &FileRef, buf: &mut [u8], offset: u64) -> usize {
        let mut f = file.lock();
        let len = f.data.len() as u64;
        if offset >= len {
            return 0;
        }
        let start = offset as usize;
        let n = self.clamp(buf.len()).min(f.data.len() - start);
        buf[..n].copy_from_slice(&f.data[start..start + n]);
        f.atime = now_secs();
        n
    }

    fn write_at(&self, file: &FileRef, buf: &[u8], offset: u64) -> FsResult<usize> {
        let n = self.take_budget(self.clamp(buf.len()))?;
        let mut f = file.lock();
        let start = offset as usize;
        let end = start + n;
        if f.data.len() < end {
            f.data.resize(end, 0);
        }
        f.data[start..end].copy_from_slice(&buf[..n]);
        let now = now_secs();
        f.mtime = now;
        f.ctime = now;
        Ok(n)
    }
}

impl Filesystem for MemFilesystem {
    fn open(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileHandle> {
        bump(&self.counters.opens);
        let path = normalize(path)?;
        let access = flags & O_ACCMODE;
        if access != O_RDONLY && access != O_WRONLY && access != O_RDWR {
            return Err(Errno::EINVAL);
        }

        let file = {
            let mut ns = self.ns.lock();
            match ns.nodes.get(&path) {
                Some(Node::Dir { .. }) => return Err(Errno::EISDIR),
                Some(Node::File(f)) => {
                    if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
                        return Err(Errno::EEXIST);
                    }
                    let f = Arc::clone(f);
                    if flags & O_TRUNC != 0 && access != O_RDONLY {
                        let mut g = f.lock();
                        g.data.clear();
                        g.mtime = now_secs();
                    }
                    f
                }
                None => {
                    if flags & O_CREAT == 0 {
                        return Err(Errno::ENOENT);
                    }
                    ns.require_parent(&path)?;
                    if file_name(&path).len() >= NAME_MAX {
                        return Err(Errno::ENAMETOOLONG);
                    }
                    let now = now_secs();
                    let f = Arc::new(Mutex::new(MemFile {
                        ino: ns.alloc_ino(),
                        mode: mode & 0o7777,
                        data: Vec::new(),
                        atime: now,
                        mtime: now,
                        ctime: now,
                    }));
                    ns.nodes.insert(path.clone(), Node::File(Arc::clone(&f)));
                    f
                }
            }
        };

        let fd = self.alloc_handle();
        self.files.insert(
            fd,
            OpenFile {
                file,
                access,
                append: flags & O_APPEND != 0,
                pos: 0,
            },
        );
        Ok(FileHandle(fd))
    }

    fn close(&self, fd: FileHandle) -> FsResult<()> {
        bump(&self.counters.closes);
        self.files.remove(&fd.0).ok_or(Errno::EBADF)?;
        match *self.close_error.lock() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn fsync(&self, fd: FileHandle) -> FsResult<()> {
        bump(&self.counters.fsyncs);
        if self.files.contains_key(&fd.0) {
            Ok(())
        } else {
            Err(Errno::EBADF)
        }
    }

    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        bump(&self.counters.reads);
        let mut of = self.files.get_mut(&fd.0).ok_or(Errno::EBADF)?;
        if !of.readable() {
            return Err(Errno::EBADF);
        }
        let n = self.read_at(&of.file, buf, of.pos);
        of.pos += n as u64;
        Ok(n)
    }

    fn write(&self, fd: FileHandle, buf: &[u8]) -> FsResult<usize> {
        bump(&self.counters.writes);
        let mut of = self.files.get_mut(&fd.0).ok_or(Errno::EBADF)?;
        if !of.writable() {
            return Err(Errno::EBADF);
        }
        let offset = if of.append {
            of.file.lock().data.len() as u64
        } else {
            of.pos
        };
        let n = self.write_at(&of.file, buf, offset)?;
        of.pos = offset + n as u64;
        Ok(n)
    }

    fn pread(&self, fd: FileHandle, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        bump(&self.counters.preads);
        let of = self.files.get(&fd.0).ok_or(Errno::EBADF)?;
        if !of.readable() {
            return Err(Errno::EBADF);
        }
        Ok(self.read_at(&of.file, buf, offset))
    }

    fn pwrite(&self, fd: FileHandle, buf: &[u8], offset: u64) -> FsResult<usize> {
        bump(&self.counters.pwrites);
        let of = self.files.get(&fd.0).ok_or(Errno::EBADF)?;
        if !of.writable() {
            return Err(Errno::EBADF);
        }
        self.write_at(&of.file, buf, offset)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        let path = normalize(path)?;
        let mut ns = self.ns.lock();
        match ns.nodes.get(&path) {
            Some(Node::File(_)) => {
                ns.nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(Errno::EISDIR),
            None => Err(Errno::ENOENT),
        }
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let old_path = normalize(old_path)?;
        let new_path = normalize(new_path)?;
        if old_path == new_path {
            return Ok(());
        }
        if new_path.starts_with(&format!("{}/", old_path)) {
            return Err(Errno::EINVAL);
        }

        let mut ns = self.ns.lock();
        let src_is_dir = match ns.nodes.get(&old_path) {
            Some(Node::Dir { .. }) => true,
            Some(Node::File(_)) => false,
            None => return Err(Errno::ENOENT),
        };
        ns.require_parent(&new_path)?;
        match ns.nodes.get(&new_path) {
            Some(Node::Dir { .. }) if !src_is_dir => return Err(Errno::EISDIR),
            Some(Node::Dir { .. }) => {
                if ns.children(&new_path).next().is_some() {
                    return Err(Errno::ENOTEMPTY);
                }
            }
            Some(Node::File(_)) if src_is_dir => return Err(Errno::ENOTDIR),
            _ => {}
        }

        let prefix = format!("{}/", old_path);
        let moved: Vec<String> = ns
            .nodes
            .keys()
            .filter(|k| **k == old_path || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = ns.nodes.remove(&key) {
                let dest = format!("{}{}", new_path, &key[old_path.len()..]);
                ns.nodes.insert(dest, node);
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> FsResult<FileAttr> {
        let path = normalize(path)?;
        let ns = self.ns.lock();
        match ns.nodes.get(&path) {
            Some(Node::File(f)) => Ok(f.lock().attr()),
            Some(Node::Dir { ino, mode, mtime }) => Ok(FileAttr {
                ino: *ino,
                mode: FileAttr::S_IFDIR | *mode,
                nlink: 2,
                blksize: BLOCK_SIZE,
                atime: *mtime,
                mtime: *mtime,
                ctime: *mtime,
                ..Default::default()
            }),
            None => Err(Errno::ENOENT),
        }
    }

    fn setattr(&self, path: &str, attr: &FileAttr, valid: u32) -> FsResult<()> {
        let path = normalize(path)?;
        let mut ns = self.ns.lock();
        match ns.nodes.get_mut(&path) {
            Some(Node::File(f)) => {
                let mut f = f.lock();
                if valid & setattr_valid::MODE != 0 {
                    f.mode = attr.permissions();
                }
                if valid & setattr_valid::SIZE != 0 {
                    f.data.resize(attr.size as usize, 0);
                }
                if valid & setattr_valid::ATIME != 0 {
                    f.atime = attr.atime;
                }
                if valid & setattr_valid::MTIME != 0 {
                    f.mtime = attr.mtime;
                }
                f.ctime = now_secs();
                Ok(())
            }
            Some(Node::Dir { mode, mtime, .. }) => {
                if valid & setattr_valid::SIZE != 0 {
                    return Err(Errno::EISDIR);
                }
                if valid & setattr_valid::MODE != 0 {
                    *mode = attr.permissions();
                }
                if valid & setattr_valid::MTIME != 0 {
                    *mtime = attr.mtime;
                }
                Ok(())
            }
            None => Err(Errno::ENOENT),
        }
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = normalize(path)?;
        let mut ns = self.ns.lock();
        if ns.nodes.contains_key(&path) {
            return Err(Errno::EEXIST);
        }
        ns.require_parent(&path)?;
        let ino = ns.alloc_ino();
        ns.nodes.insert(
            path,
            Node::Dir {
                ino,
                mode: mode & 0o7777,
                mtime: now_secs(),
            },
        );
        Ok(())
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(Errno(libc::EBUSY));
        }
        let mut ns = self.ns.lock();
        ns.require_dir(&path)?;
        if ns.children(&path).next().is_some() {
            return Err(Errno::ENOTEMPTY);
        }
        ns.nodes.remove(&path);
        Ok(())
    }

    fn opendir(&self, path: &str) -> FsResult<DirHandle> {
        bump(&self.counters.opendirs);
        let path = normalize(path)?;
        let entries = {
            let ns = self.ns.lock();
            let here = match ns.nodes.get(&path) {
                Some(Node::Dir { ino, .. }) => *ino,
                Some(Node::File(_)) => return Err(Errno::ENOTDIR),
                None => return Err(Errno::ENOENT),
            };
            let up = match parent(&path).and_then(|p| ns.nodes.get(p)) {
                Some(Node::Dir { ino, .. }) => *ino,
                _ => here,
            };
            let mut entries = vec![
                DirEntry {
                    ino: here,
                    kind: DirEntry::DT_DIR,
                    name: ".".into(),
                },
                DirEntry {
                    ino: up,
                    kind: DirEntry::DT_DIR,
                    name: "..".into(),
                },
            ];
            for (name, node) in ns.children(&path) {
                let (ino, kind) = match node {
                    Node::File(f) => (f.lock().ino, DirEntry::DT_REG),
                    Node::Dir { ino, .. } => (*ino, DirEntry::DT_DIR),
                };
                entries.push(DirEntry {
                    ino,
                    kind,
                    name: name.to_string(),
                });
            }
            entries
        };

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
        Ok(self.dirs.get(&dir.0).ok_or(Errno::EBADF)?.pos as i64)
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
        bump(&self.counters.closedirs);
        self.dirs.remove(&dir.0).map(|_| ()).ok_or(Errno::EBADF)
    }

    fn statvfs(&self, path: &str) -> FsResult<FsStats> {
        let path = normalize(path)?;
        let ns = self.ns.lock();
        if !ns.nodes.contains_key(&path) {
            return Err(Errno::ENOENT);
        }
        let mut used_blocks = 0u64;
        for node in ns.nodes.values() {
            if let Node::File(f) = node {
                used_blocks += (f.lock().data.len() as u64).div_ceil(BLOCK_SIZE);
            }
        }
        let free = TOTAL_BLOCKS.saturating_sub(used_blocks);
        let inodes = ns.nodes.len() as u64;
        Ok(FsStats {
            bsize: BLOCK_SIZE,
            frsize: BLOCK_SIZE,
            blocks: TOTAL_BLOCKS,
            bfree: free,
            bavail: free,
            files: TOTAL_BLOCKS,
            ffree: TOTAL_BLOCKS - inodes,
            favail: TOTAL_BLOCKS - inodes,
            fsid: 0,
            flag: 0,
            namemax: (NAME_MAX - 1) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_semantics() {
        let fs = MemFilesystem::new();
        assert_eq!(fs.open("/nope", O_RDONLY, 0), Err(Errno::ENOENT));
        assert_eq!(fs.open("/a/b", O_WRONLY | O_CREAT, 0o644), Err(Errno::ENOENT));

        let fd = fs.open("/f", O_WRONLY | O_CREAT | O_EXCL, 0o644).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(
            fs.open("/f", O_WRONLY | O_CREAT | O_EXCL, 0o644),
            Err(Errno::EEXIST)
        );
        assert_eq!(fs.open("/", O_RDWR, 0), Err(Errno::EISDIR));
        assert_eq!(fs.counters().opens, 5);
    }

    #[test]
    fn test_access_mode_enforced() {
        let fs = MemFilesystem::new();
        let fd = fs.creat("/f", 0o644).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.pread(fd, &mut buf, 0), Err(Errno::EBADF));
        fs.close(fd).unwrap();

        let fd = fs.open("/f", O_RDONLY, 0).unwrap();
        assert_eq!(fs.pwrite(fd, b"x", 0), Err(Errno::EBADF));
    }

    #[test]
    fn test_sparse_pwrite_and_truncate() {
        let fs = MemFilesystem::new();
        let fd = fs.creat("/f", 0o644).unwrap();
        fs.pwrite(fd, b"zz", 4).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.contents("/f").unwrap(), b"\0\0\0\0zz");

        let fd = fs.open("/f", O_WRONLY | O_TRUNC, 0).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.stat("/f").unwrap().size, 0);
    }

    #[test]
    fn test_unlinked_file_stays_readable_through_descriptor() {
        let fs = MemFilesystem::new();
        let fd = fs.open("/f", O_RDWR | O_CREAT, 0o644).unwrap();
        fs.pwrite(fd, b"data", 0).unwrap();
        fs.unlink("/f").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.pread(fd, &mut buf, 0), Ok(4));
        assert_eq!(fs.stat("/f"), Err(Errno::ENOENT));
    }

    #[test]
    fn test_rename_directory_moves_children() {
        let fs = MemFilesystem::new();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();
        let fd = fs.creat("/a/b/f", 0o644).unwrap();
        fs.close(fd).unwrap();

        fs.rename("/a", "/z").unwrap();
        assert!(fs.stat("/z/b/f").is_ok());
        assert_eq!(fs.stat("/a"), Err(Errno::ENOENT));
        assert_eq!(fs.rename("/z", "/z/b/inner"), Err(Errno::EINVAL));
    }

    #[test]
    fn test_readdir_lists_direct_children_only() {
        let fs = MemFilesystem::new();
        fs.mkdir("/d", 0o755).unwrap();
        fs.mkdir("/d/sub", 0o755).unwrap();
        fs.mkdir("/dx", 0o755).unwrap();
        for p in ["/d/b", "/d/a", "/d/sub/deep"] {
            let fd = fs.creat(p, 0o644).unwrap();
            fs.close(fd).unwrap();
        }
        let dir = fs.opendir("/d").unwrap();
        let mut names = Vec::new();
        while let Some(e) = fs.readdir(dir).unwrap() {
            names.push((e.name, e.kind));
        }
        fs.closedir(dir).unwrap();
        assert_eq!(
            names,
            vec![
                (".".to_string(), DirEntry::DT_DIR),
                ("..".to_string(), DirEntry::DT_DIR),
                ("a".to_string(), DirEntry::DT_REG),
                ("b".to_string(), DirEntry::DT_REG),
                ("sub".to_string(), DirEntry::DT_DIR),
            ]
        );
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_rmdir_rules() {
        let fs = MemFilesystem::new();
        fs.mkdir("/d", 0o755).unwrap();
        let fd = fs.creat("/d/f", 0o644).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.rmdir("/d"), Err(Errno::ENOTEMPTY));
        assert_eq!(fs.rmdir("/d/f"), Err(Errno::ENOTDIR));
        fs.unlink("/d/f").unwrap();
        fs.rmdir("/d").unwrap();
        assert_eq!(fs.rmdir("/d"), Err(Errno::ENOENT));
    }

    #[test]
    fn test_statvfs_accounts_usage() {
        let fs = MemFilesystem::new();
        let before = fs.statvfs("/").unwrap();
        let fd = fs.creat("/big", 0o644).unwrap();
        fs.pwrite(fd, &vec![1u8; 3 * BLOCK_SIZE as usize], 0).unwrap();
        fs.close(fd).unwrap();
        let after = fs.statvfs("/").unwrap();
        assert_eq!(before.bfree - after.bfree, 3);
    }
}
