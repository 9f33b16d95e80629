/// Abbreviated commit hash for log lines and summaries.
pub fn short_hash(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(hash.len());
    &hash[..end]
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Unescape a path as git prints it in patch headers.
///
/// Paths with spaces, quotes or non-ASCII bytes are wrapped in double quotes with C-style
/// escapes and octal-encoded bytes. Unquoted paths are returned as-is.
///
/// ```
/// use git_lineage::utils::unescape_git_path;
///
/// assert_eq!(unescape_git_path("simple.txt"), "simple.txt");
/// assert_eq!(unescape_git_path("\"a/path with spaces.txt\""), "a/path with spaces.txt");
/// assert_eq!(unescape_git_path("\"a/\\344\\270\\255.txt\""), "a/中.txt");
/// ```
pub fn unescape_git_path(path: &str) -> String {
    if path.len() < 2 || !path.starts_with('"') || !path.ends_with('"') {
        return path.to_string();
    }

    let inner = &path[1..path.len() - 1];
    let mut bytes: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.peek().copied() {
            Some('\\') => {
                chars.next();
                bytes.push(b'\\');
            }
            Some('"') => {
                chars.next();
                bytes.push(b'"');
            }
            Some('n') => {
                chars.next();
                bytes.push(b'\n');
            }
            Some('t') => {
                chars.next();
                bytes.push(b'\t');
            }
            Some(d) if ('0'..='7').contains(&d) => {
                let mut octal = String::new();
                while octal.len() < 3 {
                    match chars.peek() {
                        Some(&d) if ('0'..='7').contains(&d) => {
                            octal.push(d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if let Ok(byte) = u8::from_str_radix(&octal, 8) {
                    bytes.push(byte);
                }
            }
            _ => bytes.push(b'\\'),
        }
    }

    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "01234567");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語", 5), "日本語");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_unescape_git_path_escapes() {
        assert_eq!(unescape_git_path("\"tab\\there\""), "tab\there");
        assert_eq!(unescape_git_path("\"quote\\\"d\""), "quote\"d");
        assert_eq!(unescape_git_path("\""), "\"");
    }
}
