//! Pure text-scanning helpers shared by the introspection passes
//!
//! Every function here works on byte offsets into the source and only ever
//! splits at ASCII delimiters, so returned offsets are valid `str` boundaries.
//! None of them panic on malformed input; they return `None` instead.

use {once_cell::sync::Lazy, regex::Regex};

/// A string literal found after a `key =` / `key:` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedLiteral {
    /// Offset where the key starts
    pub start: usize,
    /// Unescaped literal content
    pub value: String,
    /// Offset just past the closing quote
    pub end: usize,
}

/// Start of any request handler; ends the current section.
static HANDLER_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)setRequestHandler\s*\(|^[ \t]*@\w+(?:\.\w+)*\s*\(")
        .expect("handler boundary regex must compile")
});

/// Skip ASCII whitespace starting at `pos`
pub fn skip_ws(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = pos;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Offset of the next newline at or after `pos`, or the end of text
pub fn skip_line(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |n| pos + n)
}

/// Read a quoted literal (`"`, `'`, backtick, or Python triple quotes) at `start`.
///
/// Python string prefixes (`f`, `r`, `b`, `u`, up to two letters) are accepted.
/// Returns the unescaped content and the offset just past the closing quote.
pub fn read_string_literal(text: &str, start: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut pos = start;
    while pos < bytes.len()
        && pos - start < 2
        && matches!(bytes[pos], b'f' | b'r' | b'b' | b'u' | b'F' | b'R' | b'B' | b'U')
    {
        pos += 1;
    }

    let quote = *bytes.get(pos)?;
    if !matches!(quote, b'"' | b'\'' | b'`') {
        return None;
    }

    let triple = quote != b'`'
        && bytes.get(pos + 1) == Some(&quote)
        && bytes.get(pos + 2) == Some(&quote);
    let content_start = if triple { pos + 3 } else { pos + 1 };
    let multiline = triple || quote == b'`';
    let quote = quote as char;

    let mut content = String::new();
    let mut chars = text[content_start..].char_indices();
    while let Some((offset, ch)) = chars.next() {
        let at = content_start + offset;
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => content.push('\n'),
                Some((_, 't')) => content.push('\t'),
                Some((_, 'r')) => content.push('\r'),
                Some((_, other)) => content.push(other),
                None => return None,
            },
            c if c == quote => {
                if !triple {
                    return Some((content, at + 1));
                }
                if text[at..].starts_with(&quote.to_string().repeat(3)) {
                    return Some((content, at + 3));
                }
                content.push(c);
            }
            '\n' if !multiline => return None,
            c => content.push(c),
        }
    }
    None
}

/// Return the bracket-balanced block opening at `open` (`{`, `[` or `(`).
///
/// String literals and line comments are skipped so brackets inside them do
/// not count. Returns `None` when the block never closes.
pub fn balanced_block(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(open), Some(b'{' | b'[' | b'(')) {
        return None;
    }

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                if let Some((_, end)) = read_string_literal(text, i) {
                    i = end;
                    continue;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line(text, i);
                continue;
            }
            b'#' => {
                i = skip_line(text, i);
                continue;
            }
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Tracks the brackets still open at increasing offsets of one text.
///
/// Strings and line comments are skipped the same way [`balanced_block`]
/// skips them. Offsets must be queried in increasing order.
#[derive(Debug, Default)]
pub struct OpenBrackets {
    stack: Vec<usize>,
    pos: usize,
}

impl OpenBrackets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the innermost bracket open at `at`
    pub fn innermost_at(&mut self, text: &str, at: usize) -> Option<usize> {
        let bytes = text.as_bytes();
        let at = at.min(bytes.len());
        while self.pos < at {
            let i = self.pos;
            match bytes[i] {
                b'"' | b'\'' | b'`' => {
                    if let Some((_, end)) = read_string_literal(text, i) {
                        self.pos = end;
                        continue;
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    self.pos = skip_line(text, i);
                    continue;
                }
                b'#' => {
                    self.pos = skip_line(text, i);
                    continue;
                }
                b'{' | b'[' | b'(' => self.stack.push(i),
                b'}' | b']' | b')' => {
                    self.stack.pop();
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.stack.last().copied()
    }
}

/// First `key` match in `[from, to)` that is followed by a string literal
pub fn find_keyed_literal(text: &str, key: &Regex, from: usize, to: usize) -> Option<KeyedLiteral> {
    let to = to.min(text.len());
    let mut cursor = from;
    while cursor < to {
        let m = key.find_at(text, cursor)?;
        if m.start() >= to {
            return None;
        }
        let literal_at = skip_ws(text, m.end());
        if let Some((value, end)) = read_string_literal(text, literal_at) {
            return Some(KeyedLiteral {
                start: m.start(),
                value,
                end,
            });
        }
        cursor = m.end().max(cursor + 1);
    }
    None
}

/// Slice from the first `marker` match up to the next request handler
pub fn section<'a>(text: &'a str, marker: &Regex) -> Option<&'a str> {
    let m = marker.find(text)?;
    let end = HANDLER_BOUNDARY
        .find_at(text, m.end())
        .map_or(text.len(), |b| b.start());
    Some(&text[m.start()..end])
}

/// Find the `}` closing a `{` at `open`, counting nested braces only.
///
/// Used inside template strings and f-strings where quotes belong to the
/// embedded expression.
pub fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Names that are safe as tool identifiers
pub fn is_identifier_safe(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_python_and_typescript_literals() {
        assert_eq!(
            read_string_literal(r#"f"{API}/posts" rest"#, 0),
            Some(("{API}/posts".to_string(), 14))
        );
        assert_eq!(
            read_string_literal("'it\\'s'", 0),
            Some(("it's".to_string(), 7))
        );
        assert_eq!(
            read_string_literal("`a\nb`", 0),
            Some(("a\nb".to_string(), 5))
        );
        assert_eq!(
            read_string_literal("\"\"\"doc \"quoted\" text\"\"\"", 0),
            Some(("doc \"quoted\" text".to_string(), 23))
        );
    }

    #[test]
    fn rejects_unterminated_and_non_literals() {
        assert_eq!(read_string_literal("\"open", 0), None);
        assert_eq!(read_string_literal("\"line\nbreak\"", 0), None);
        assert_eq!(read_string_literal("foo", 0), None);
        assert_eq!(read_string_literal("", 0), None);
        assert_eq!(read_string_literal("x", 5), None);
    }

    #[test]
    fn balanced_block_skips_brackets_in_strings_and_comments() {
        let text = r#"{"a": "}", // }
  "b": [1, {"c": 2}]} trailing"#;
        let block = balanced_block(text, 0).unwrap();
        assert!(block.ends_with("]}"));
        assert!(!block.contains("trailing"));
    }

    #[test]
    fn balanced_block_requires_closing_bracket() {
        assert_eq!(balanced_block("{ \"a\": [1, 2 ", 0), None);
        assert_eq!(balanced_block("abc", 0), None);
    }

    #[test]
    fn keyed_literal_skips_comparisons() {
        let key = Regex::new(r#"["']?\bname\b["']?\s*[:=]"#).unwrap();
        let text = r#"if name == "x": pass
tool(name="get_posts")"#;
        let found = find_keyed_literal(text, &key, 0, text.len()).unwrap();
        assert_eq!(found.value, "get_posts");
        assert_eq!(&text[found.end..], ")");
    }

    #[test]
    fn section_stops_at_next_handler() {
        let marker = Regex::new(r"@\w+\.list_tools\(").unwrap();
        let text = "x\n@server.list_tools()\nasync def a(): pass\n@server.call_tool()\nasync def b(): pass";
        let found = section(text, &marker).unwrap();
        assert!(found.starts_with("@server.list_tools()"));
        assert!(!found.contains("call_tool"));
    }

    #[test]
    fn open_brackets_track_innermost_entry() {
        let text = r#"[Tool(a="(", b=1), {"c": [2]}, x]"#;
        let mut brackets = OpenBrackets::new();
        assert_eq!(brackets.innermost_at(text, 0), None);
        assert_eq!(brackets.innermost_at(text, text.find("b=").unwrap()), Some(5));
        assert_eq!(brackets.innermost_at(text, text.find("2").unwrap()), Some(25));
        assert_eq!(brackets.innermost_at(text, text.find("x").unwrap()), Some(0));
        assert_eq!(brackets.innermost_at(text, text.len()), None);
    }

    #[test]
    fn identifier_safety() {
        assert!(is_identifier_safe("get_post_by_id"));
        assert!(is_identifier_safe("list-users"));
        assert!(!is_identifier_safe("1abc"));
        assert!(!is_identifier_safe("has space"));
        assert!(!is_identifier_safe(""));
    }
}
