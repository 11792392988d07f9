use xpn_types::Errno;

use crate::FsResult;

/// Canonical absolute form of a request path.
///
/// Empty and `.` components are dropped; `..` is refused so a request can
/// never climb above the served root.
pub fn normalize(path: &str) -> FsResult<String> {
    if path.is_empty() {
        return Err(Errno::ENOENT);
    }
    let mut out = String::with_capacity(path.len() + 1);
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => return Err(Errno::EACCES),
            c => {
                out.push('/');
                out.push_str(c);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Parent of a normalized path. The root has none.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Final component of a normalized path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}
