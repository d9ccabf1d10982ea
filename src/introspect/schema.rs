//! Input-schema normalization
//!
//! Schemas are written as Python dict literals or TypeScript object literals.
//! They are rewritten into JSON text (quote style, literal spelling, unquoted
//! keys, trailing commas, comments) and then parsed structurally.

use {
    super::scan,
    crate::registry::empty_object_schema,
    serde_json::Value,
};

/// Structural value of a schema block, or `{type: object, properties: {}}`.
pub fn normalize_schema(block: &str) -> Value {
    to_json_text(block)
        .and_then(|json| serde_json::from_str::<Value>(&json).ok())
        .filter(Value::is_object)
        .unwrap_or_else(empty_object_schema)
}

/// Rewrite a dict/object literal into JSON text.
///
/// Returns `None` as soon as the block contains something that has no JSON
/// equivalent (variables, calls, spreads, interpolated templates).
pub fn to_json_text(block: &str) -> Option<String> {
    let bytes = block.as_bytes();
    let mut out = String::with_capacity(block.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' | b'`' => {
                let (content, end) = scan::read_string_literal(block, i)?;
                if b == b'`' && content.contains("${") {
                    return None;
                }
                out.push_str(&serde_json::to_string(&content).ok()?);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = scan::skip_line(block, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = block[i + 2..].find("*/")?;
                i += close + 4;
            }
            b'#' => i = scan::skip_line(block, i),
            b'}' | b']' => {
                trim_trailing_comma(&mut out);
                out.push(b as char);
                i += 1;
            }
            b'(' | b')' | b'=' | b';' => return None,
            b'-' | b'+' | b'.' | b'0'..=b'9' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-' | b'_')
                {
                    i += 1;
                }
                out.push_str(&normalize_number(&block[start..i])?);
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$')) {
                    i += 1;
                }
                let ident = &block[start..i];
                let after = scan::skip_ws(block, i);

                if bytes.get(after) == Some(&b':') {
                    out.push_str(&serde_json::to_string(ident).ok()?);
                    continue;
                }
                match ident {
                    "true" | "True" => out.push_str("true"),
                    "false" | "False" => out.push_str("false"),
                    "null" | "None" | "undefined" => out.push_str("null"),
                    // TypeScript `as const` assertions carry no value
                    "as" => {
                        let next_start = after;
                        let mut next_end = next_start;
                        while next_end < bytes.len() && bytes[next_end].is_ascii_alphabetic() {
                            next_end += 1;
                        }
                        if &block[next_start..next_end] != "const" {
                            return None;
                        }
                        i = next_end;
                    }
                    _ => return None,
                }
            }
            _ if b.is_ascii() => {
                out.push(b as char);
                i += 1;
            }
            _ => {
                let ch = block[i..].chars().next()?;
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    Some(out)
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
}

fn normalize_number(raw: &str) -> Option<String> {
    let cleaned: String = raw.trim_start_matches('+').chars().filter(|&c| c != '_').collect();
    let cleaned = match cleaned.strip_prefix('.') {
        Some(rest) => format!("0.{rest}"),
        None => cleaned,
    };
    let cleaned = match cleaned.strip_suffix('.') {
        Some(rest) => rest.to_string(),
        None => cleaned,
    };
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Number(_)) => Some(cleaned),
        _ => None,
    }
}
