//! Call-template recovery from the tool-call handler
//!
//! The handler is a chain of branches keyed on the tool name (`if/elif name ==`
//! in Python, `case "...":` or `if (name === ...)` in TypeScript). Each branch
//! body is searched for the request it issues: the HTTP verb, the URL built on
//! the API base URL, the arguments interpolated into that URL, and whether
//! query parameters or a body are attached.

use {
    super::scan,
    crate::registry::{CallTemplate, HttpMethod, PathParam},
    once_cell::sync::Lazy,
    regex::Regex,
};

const BASE_URL_NAMES: &str =
    r"(?:API_BASE_URL|BASE_URL|API_URL|api_base_url|base_url|baseUrl|baseURL|apiBaseUrl)";

static BRANCH_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:\b(?:if|elif)\s*\(?\s*(?:name|tool_name|toolName|request\.params\.name)\s*===?\s*|\bcase\s+)["'`]([A-Za-z_][\w\-]*)["'`]"#,
    )
    .expect("branch head regex must compile")
});

/// `{API_BASE_URL}` / `${API_BASE_URL}` inside an f-string or template literal
static BASE_URL_INTERPOLATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\$?\{{\s*(?:self\.|this\.)?{BASE_URL_NAMES}\s*\}}"))
        .expect("base url interpolation regex must compile")
});

/// `API_BASE_URL + "/posts/" + args.id`
static BASE_URL_CONCAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b{BASE_URL_NAMES}\s*\+\s*"))
        .expect("base url concatenation regex must compile")
});

static VERB_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z_][\w]*)\s*\.\s*(get|post|put|patch|delete)\s*\(")
        .expect("verb call regex must compile")
});

static EXPLICIT_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:\bmethod\s*[:=]\s*|\.request\s*\(\s*)["'](get|post|put|patch|delete)["']"#,
    )
    .expect("explicit method regex must compile")
});

static QUERY_IDIOM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bparams\s*[=:]|URLSearchParams|searchParams|\?\$\{|[(,]\s*query\s*=")
        .expect("query idiom regex must compile")
});

static BODY_IDIOM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[(,]\s*(?:json|data|content)\s*=|\bbody\s*:|JSON\.stringify|\bdata\s*:")
        .expect("body idiom regex must compile")
});

static SUBSCRIPT_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[\s*["'](\w+)["']\s*\]"#).expect("subscript regex must compile")
});

static GET_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\.get\(\s*["'](\w+)["']"#).expect("get-call regex must compile")
});

static MEMBER_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:args|arguments|params|input|toolArgs)\s*\??\.\s*([A-Za-z_]\w*)")
        .expect("member access regex must compile")
});

static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_]\w*").expect("identifier regex must compile"));

static DESTRUCTURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:const|let|var)\s*\{([^}]*)\}\s*=\s*(?:args|arguments|params|input|toolArgs|request\.params\.arguments)\b",
    )
    .expect("destructuring regex must compile")
});

/// Receivers whose `.get(` is a dictionary lookup, not an HTTP call
const NON_HTTP_RECEIVERS: &[&str] = &[
    "arguments", "args", "params", "kwargs", "environ", "headers", "data", "body", "query",
    "payload", "self", "dict", "map", "cache", "os",
];

/// Wrappers around an interpolated value that do not name the argument
const VALUE_WRAPPERS: &[&str] = &[
    "str", "String", "int", "Number", "encodeURIComponent", "encodeURI", "quote", "quote_plus",
    "urllib", "parse", "safe", "toString", "await",
];

/// Every `(tool name, template)` pair the handler section declares, in order.
pub fn extract_templates(section: &str) -> Vec<(String, CallTemplate)> {
    let heads: Vec<(usize, usize, String)> = BRANCH_HEAD
        .captures_iter(section)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            Some((whole.start(), whole.end(), name))
        })
        .collect();

    let mut templates = Vec::new();
    for (i, (_, head_end, name)) in heads.iter().enumerate() {
        let body_end = heads.get(i + 1).map_or(section.len(), |next| next.0);
        let body = &section[*head_end..body_end];
        if let Some(template) = parse_branch(body) {
            templates.push((name.clone(), template));
        }
    }
    templates
}

/// Span of the URL expression within a branch body
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlExpr {
    start: usize,
    end: usize,
    /// Path with `{expr}` placeholders, relative to the base URL
    raw_path: String,
}

/// Recover the template of a single branch body.
pub fn parse_branch(body: &str) -> Option<CallTemplate> {
    let url = locate_url(body)?;
    let method = explicit_method(body)
        .or_else(|| verb_call_method(body, url.start))
        .unwrap_or(HttpMethod::Get);

    let (path_part, query_in_path) = match split_query(&url.raw_path) {
        Some((path, _)) => (path, true),
        None => (url.raw_path.as_str(), false),
    };
    let (path, path_params) = bind_path(path_part, body);

    let has_query_params = query_in_path || QUERY_IDIOM.is_match(body);
    let has_body =
        method.allows_body() && (BODY_IDIOM.is_match(body) || has_positional_body(body, url.end));

    Some(CallTemplate {
        method,
        path,
        path_params,
        has_query_params,
        has_body,
        origin: crate::registry::TemplateOrigin::Parsed,
    })
}

fn locate_url(body: &str) -> Option<UrlExpr> {
    interpolated_url(body)
        .or_else(|| concatenated_url(body))
        .or_else(|| relative_url(body))
}

/// `f"{API_BASE_URL}/posts/{arguments['id']}"` or `` `${API_BASE_URL}/posts/${args.id}` ``
fn interpolated_url(body: &str) -> Option<UrlExpr> {
    let m = BASE_URL_INTERPOLATION.find(body)?;
    let (quote_at, quote) = body[..m.start()]
        .char_indices()
        .rev()
        .find(|(_, c)| matches!(c, '"' | '\'' | '`'))?;

    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = m.end();
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'\n' if quote != '`' => return None,
            b if depth == 0 && b as char == quote => {
                return Some(UrlExpr {
                    start: quote_at,
                    end: i + 1,
                    raw_path: body[m.end()..i].to_string(),
                });
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `API_BASE_URL + "/posts/" + args.id`
fn concatenated_url(body: &str) -> Option<UrlExpr> {
    let m = BASE_URL_CONCAT.find(body)?;
    let bytes = body.as_bytes();
    let mut raw_path = String::new();
    let mut pos = m.end();

    loop {
        pos = scan::skip_ws(body, pos);
        if let Some((literal, end)) = scan::read_string_literal(body, pos) {
            raw_path.push_str(&literal);
            pos = end;
        } else {
            let start = pos;
            let mut depth = 0usize;
            while pos < bytes.len() {
                match bytes[pos] {
                    b'(' | b'[' => depth += 1,
                    b')' | b']' if depth > 0 => depth -= 1,
                    b'+' | b',' | b')' | b']' | b';' | b'\n' if depth == 0 => break,
                    _ => {}
                }
                pos += 1;
            }
            let expr = body[start..pos].trim();
            if expr.is_empty() {
                break;
            }
            raw_path.push('{');
            raw_path.push_str(expr);
            raw_path.push('}');
        }

        let next = scan::skip_ws(body, pos);
        if bytes.get(next) == Some(&b'+') {
            pos = next + 1;
        } else {
            break;
        }
    }

    if raw_path.is_empty() {
        return None;
    }
    Some(UrlExpr {
        start: m.start(),
        end: pos,
        raw_path,
    })
}

/// `client.get("/posts")` on a client created with a base URL
fn relative_url(body: &str) -> Option<UrlExpr> {
    VERB_CALL.captures_iter(body).find_map(|caps| {
        let receiver = caps.get(1)?.as_str();
        if NON_HTTP_RECEIVERS.contains(&receiver) {
            return None;
        }
        let call = caps.get(0)?;
        let literal_at = scan::skip_ws(body, call.end());
        let (literal, end) = scan::read_string_literal(body, literal_at)?;
        let literal = literal.replace("${", "{");
        literal.starts_with('/').then(|| UrlExpr {
            start: literal_at,
            end,
            raw_path: literal,
        })
    })
}

fn explicit_method(body: &str) -> Option<HttpMethod> {
    EXPLICIT_METHOD
        .captures(body)
        .and_then(|caps| HttpMethod::parse(caps.get(1)?.as_str()))
}

/// Verb of the HTTP call closest before the URL, else the first one after it.
fn verb_call_method(body: &str, url_start: usize) -> Option<HttpMethod> {
    let calls: Vec<(usize, HttpMethod)> = VERB_CALL
        .captures_iter(body)
        .filter_map(|caps| {
            let receiver = caps.get(1)?.as_str();
            if NON_HTTP_RECEIVERS.contains(&receiver) {
                return None;
            }
            Some((caps.get(0)?.start(), HttpMethod::parse(caps.get(2)?.as_str())?))
        })
        .collect();

    calls
        .iter()
        .rev()
        .find(|(at, _)| *at < url_start)
        .or_else(|| calls.iter().find(|(at, _)| *at >= url_start))
        .map(|(_, method)| *method)
}

/// Split `path?query` at the first `?` outside a placeholder
fn split_query(raw: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, b) in raw.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'?' if depth == 0 => return Some((&raw[..i], &raw[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Replace each `{expr}` / `${expr}` with `{placeholder}` and record its binding.
fn bind_path(raw: &str, body: &str) -> (String, Vec<PathParam>) {
    let bytes = raw.as_bytes();
    let mut path = String::with_capacity(raw.len());
    let mut params = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let open = match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => i + 1,
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                path.push('{');
                i += 2;
                continue;
            }
            b'{' => i,
            _ => {
                let ch = raw[i..].chars().next().unwrap_or_default();
                path.push(ch);
                i += ch.len_utf8().max(1);
                continue;
            }
        };

        let Some(close) = scan::matching_brace(raw, open) else {
            path.push_str(&raw[i..]);
            break;
        };
        let (placeholder, argument) = resolve_binding(raw[open + 1..close].trim(), body);
        path.push('{');
        path.push_str(&placeholder);
        path.push('}');
        if !params.iter().any(|p: &PathParam| p.placeholder == placeholder) {
            params.push(PathParam::new(placeholder, argument));
        }
        i = close + 1;
    }

    (path, params)
}

/// `(placeholder, argument name)` for one interpolated expression
fn resolve_binding(expr: &str, body: &str) -> (String, String) {
    if let Some(argument) = argument_reference(expr) {
        return (argument.clone(), argument);
    }
    let ident = IDENT
        .find_iter(expr)
        .map(|m| m.as_str())
        .find(|ident| !VALUE_WRAPPERS.contains(ident))
        .unwrap_or("value")
        .to_string();
    let argument = local_binding(&ident, body).unwrap_or_else(|| ident.clone());
    (ident, argument)
}

/// Argument named directly by an expression over the arguments object
fn argument_reference(expr: &str) -> Option<String> {
    [&*SUBSCRIPT_ARG, &*GET_ARG, &*MEMBER_ARG]
        .iter()
        .find_map(|re| re.captures(expr).and_then(|caps| Some(caps.get(1)?.as_str().to_string())))
}

/// Resolve a local variable to the argument it was assigned from
fn local_binding(ident: &str, body: &str) -> Option<String> {
    let assignment = Regex::new(&format!(
        r"\b{}\s*(?::\s*[\w\[\]|. ]+)?=\s*([^=\n;][^\n;]*)",
        regex::escape(ident)
    ))
    .ok()?;
    if let Some(argument) = assignment
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .find_map(|rhs| argument_reference(rhs.as_str()))
    {
        return Some(argument);
    }

    DESTRUCTURE.captures_iter(body).find_map(|caps| {
        caps.get(1)?.as_str().split(',').find_map(|field| {
            let field = field.split('=').next()?.trim();
            match field.split_once(':') {
                Some((source, local)) if local.trim() == ident => Some(source.trim().to_string()),
                None if field == ident => Some(field.to_string()),
                _ => None,
            }
        })
    })
}

/// `axios.post(url, args)`: a second positional argument that is not a config object
fn has_positional_body(body: &str, url_end: usize) -> bool {
    let bytes = body.as_bytes();
    let mut pos = scan::skip_ws(body, url_end);
    if bytes.get(pos) != Some(&b',') {
        return false;
    }
    pos = scan::skip_ws(body, pos + 1);
    let rest = &body[pos..];

    if let Some(object) = rest.strip_prefix('{') {
        let object = object.trim_start();
        return !["params", "headers", "timeout"]
            .iter()
            .any(|key| object.starts_with(key));
    }
    match IDENT.find(rest) {
        Some(m) if m.start() == 0 => {
            let after = scan::skip_ws(rest, m.end());
            // keyword arguments such as `params=` or `timeout=` are not a body
            !(rest.as_bytes().get(after) == Some(&b'=')
                && rest.as_bytes().get(after + 1) != Some(&b'='))
        }
        _ => false,
    }
}
