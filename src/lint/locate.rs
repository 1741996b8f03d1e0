//! Mapping dotted error paths back to positions in the source text.

use once_cell::sync::Lazy;
use regex::Regex;

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_$-]+)((?:\[\d+\])*)$").unwrap());
static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Line-start offset table for O(log n) offset-to-position conversion.
pub struct LineIndex {
    /// Byte offset of the first character of each line.
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// Convert a byte offset to a 1-based (line, column) pair.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.starts[line];
        (line as u32 + 1, column as u32 + 1)
    }
}

/// Resolve a dotted+indexed path like `wheres[0].field` to the byte span
/// of the corresponding value in `source`. Returns `None` when the walk
/// loses its footing; callers fall back to line 1 column 1.
///
/// The walker alternates two moves over the raw text: a regex that finds
/// the next `"key":` occurrence inside the current window, and a
/// bracket-counting scan that steps to the n-th element of an array. It
/// does not build a JSON tree, so it tolerates sources that almost parse.
pub fn locate(source: &str, path: &str) -> Option<(usize, usize)> {
    if path.is_empty() {
        return None;
    }

    let mut window = 0..source.len();
    for segment in path.split('.') {
        let caps = SEGMENT_RE.captures(segment)?;
        let key = caps.get(1)?.as_str();

        let key_re = Regex::new(&format!(r#""{}"\s*:"#, regex::escape(key))).ok()?;
        let found = key_re.find(&source[window.clone()])?;
        let value_start = skip_ws(source, window.start + found.end());
        let value_end = value_span(source, value_start)?;
        window = value_start..value_end;

        for index in INDEX_RE.captures_iter(caps.get(2)?.as_str()) {
            let n: usize = index[1].parse().ok()?;
            window = element_span(source, window, n)?;
        }
    }

    Some((window.start, window.end))
}

fn skip_ws(source: &str, mut offset: usize) -> usize {
    let bytes = source.as_bytes();
    while offset < bytes.len() && (bytes[offset] as char).is_ascii_whitespace() {
        offset += 1;
    }
    offset
}

/// Span of the JSON value starting at `start`: a balanced object or array,
/// a string, or a bare scalar running to the next delimiter.
fn value_span(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    match *bytes.get(start)? {
        b'{' | b'[' => balanced_end(source, start),
        b'"' => string_end(source, start),
        _ => {
            let mut end = start;
            while end < bytes.len() && !matches!(bytes[end], b',' | b'}' | b']') {
                end += 1;
            }
            Some(end)
        }
    }
}

/// Step into the n-th element of the array occupying `window`.
fn element_span(source: &str, window: std::ops::Range<usize>, n: usize) -> Option<std::ops::Range<usize>> {
    let bytes = source.as_bytes();
    if *bytes.get(window.start)? != b'[' {
        return None;
    }

    let mut offset = skip_ws(source, window.start + 1);
    for _ in 0..n {
        let end = value_span(source, offset)?;
        offset = skip_ws(source, end);
        if *bytes.get(offset)? != b',' {
            return None;
        }
        offset = skip_ws(source, offset + 1);
    }

    let end = value_span(source, offset)?;
    if end > window.end {
        return None;
    }
    Some(offset..end)
}

/// End offset (exclusive) of a balanced `{...}` or `[...]`, skipping
/// brackets inside string literals.
fn balanced_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut offset = start;
    while offset < bytes.len() {
        match bytes[offset] {
            b'"' => offset = string_end(source, offset)?.saturating_sub(1),
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
        offset += 1;
    }
    None
}

/// End offset (exclusive) of the string literal starting at `start`.
fn string_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut offset = start + 1;
    while offset < bytes.len() {
        match bytes[offset] {
            b'\\' => offset += 2,
            b'"' => return Some(offset + 1),
            _ => offset += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\nef");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(7), (3, 2));
    }

    #[test]
    fn test_locate_top_level_key() {
        let source = r#"{"select": "id", "from": "user"}"#;
        let (start, end) = locate(source, "from").unwrap();
        assert_eq!(&source[start..end], r#""user""#);
    }

    #[test]
    fn test_locate_array_element() {
        let source = r#"{"wheres": [{"field": "a"}, {"op": "="}]}"#;
        let (start, end) = locate(source, "wheres[1]").unwrap();
        assert_eq!(&source[start..end], r#"{"op": "="}"#);
    }

    #[test]
    fn test_locate_nested_key() {
        let source = r#"{"wheres": [{"op": "=", "value": "a"}]}"#;
        let (start, end) = locate(source, "wheres[0].value").unwrap();
        assert_eq!(&source[start..end], r#""a""#);
    }

    #[test]
    fn test_locate_missing_key() {
        assert!(locate(r#"{"from": "t"}"#, "select").is_none());
        assert!(locate(r#"{"wheres": []}"#, "wheres[2]").is_none());
    }

    #[test]
    fn test_locate_multiline() {
        let source = "{\n  \"from\": \"t\",\n  \"orders\": [\"id dasc\"]\n}";
        let (start, _) = locate(source, "orders[0]").unwrap();
        let index = LineIndex::new(source);
        assert_eq!(index.position(start), (3, 14));
    }
}
