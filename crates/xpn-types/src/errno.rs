use std::fmt;

/// An OS error number as reported back to clients in `server_errno`.
///
/// Backing-store calls return `Result<T, Errno>` so the error travels with the
/// result instead of through a thread-global.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Errno(pub i32);

impl Errno {
    pub const NONE: Errno = Errno(0);
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EBADF: Errno = Errno(libc::EBADF);
    pub const EACCES: Errno = Errno(libc::EACCES);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOSPC: Errno = Errno(libc::ENOSPC);
    pub const ENAMETOOLONG: Errno = Errno(libc::ENAMETOOLONG);
    pub const ENOTEMPTY: Errno = Errno(libc::ENOTEMPTY);
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);

    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Extract the errno from an I/O error, falling back to `EIO` for errors
    /// that did not originate from the OS.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Errno(code),
            None => match err.kind() {
                std::io::ErrorKind::NotFound => Errno::ENOENT,
                std::io::ErrorKind::PermissionDenied => Errno::EPERM,
                std::io::ErrorKind::AlreadyExists => Errno::EEXIST,
                std::io::ErrorKind::InvalidInput => Errno::EINVAL,
                _ => Errno::EIO,
            },
        }
    }
}

impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        Errno::from_io(&err)
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({})", self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_os_error() {
        let err = std::io::Error::from_raw_os_error(libc::EISDIR);
        assert_eq!(Errno::from(err), Errno::EISDIR);
    }

    #[test]
    fn test_from_synthetic_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Errno::from_io(&err), Errno::ENOENT);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "odd");
        assert_eq!(Errno::from_io(&err), Errno::EIO);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Errno::ENOENT), format!("Errno({})", libc::ENOENT));
    }
}
