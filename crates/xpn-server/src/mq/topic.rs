use std::fmt;

/// Destination of a published message: `path[/length[/offset]]`.
///
/// Only trailing segments that parse as unsigned integers are taken as
/// fields, so a path without numeric suffixes is kept whole. `length == 0`
/// means "the whole payload".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKey {
    pub path: String,
    pub length: u64,
    pub offset: u64,
}

fn split_numeric(s: &str) -> Option<(&str, u64)> {
    let (head, tail) = s.rsplit_once('/')?;
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = tail.parse().ok()?;
    Some((head, value))
}

impl TopicKey {
    pub fn parse(topic: &str) -> Self {
        if let Some((rest, last)) = split_numeric(topic) {
            if let Some((path, length)) = split_numeric(rest) {
                return Self {
                    path: path.to_string(),
                    length,
                    offset: last,
                };
            }
            return Self {
                path: rest.to_string(),
                length: last,
                offset: 0,
            };
        }
        Self {
            path: topic.to_string(),
            length: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.path, self.length, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str, length: u64, offset: u64) -> TopicKey {
        TopicKey {
            path: path.into(),
            length,
            offset,
        }
    }

    #[test]
    fn test_two_fields() {
        assert_eq!(TopicKey::parse("/data/out.bin/4096/8192"), key("/data/out.bin", 4096, 8192));
    }

    #[test]
    fn test_one_field() {
        assert_eq!(TopicKey::parse("/data/out.bin/4096"), key("/data/out.bin", 4096, 0));
    }

    #[test]
    fn test_no_field() {
        assert_eq!(TopicKey::parse("/data/out.bin"), key("/data/out.bin", 0, 0));
        assert_eq!(TopicKey::parse("plain"), key("plain", 0, 0));
    }

    #[test]
    fn test_non_numeric_tail_stays_in_path() {
        assert_eq!(TopicKey::parse("/a/b/c/12"), key("/a/b/c", 12, 0));
        assert_eq!(TopicKey::parse("/a/-1/3"), key("/a/-1", 3, 0));
        assert_eq!(TopicKey::parse("/a/b/"), key("/a/b/", 0, 0));
    }

    #[test]
    fn test_display_is_parseable() {
        let k = key("/x/y", 10, 20);
        assert_eq!(TopicKey::parse(&k.to_string()), k);
    }
}
