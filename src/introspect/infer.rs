//! Naming-convention fallback for tools whose call shape was not found
//!
//! `create_post` becomes `POST /posts`, `get_post_by_id` becomes
//! `GET /posts/{id}`, `deleteUser` with an `id` property becomes
//! `DELETE /users/{id}`.

use crate::registry::{CallTemplate, HttpMethod, ToolDefinition};

const POST_VERBS: &[&str] = &["create", "add", "new", "post", "insert", "submit", "send"];
const PUT_VERBS: &[&str] = &["update", "edit", "modify", "put", "replace", "set", "upsert"];
const PATCH_VERBS: &[&str] = &["patch"];
const DELETE_VERBS: &[&str] = &["delete", "remove", "destroy", "del"];
const READ_VERBS: &[&str] = &["get", "list", "fetch", "retrieve", "read", "search", "find", "query", "all"];

/// Synthesize a template from the tool's name and input schema.
pub fn infer_template(tool: &ToolDefinition) -> CallTemplate {
    let words = split_words(&tool.name);
    let method = infer_method(&words);

    let (resource_words, key_words) = match words.iter().position(|w| w == "by") {
        Some(at) => (&words[..at], &words[at + 1..]),
        None => (&words[..], &words[words.len()..]),
    };
    let resource_words: Vec<&str> = resource_words
        .iter()
        .map(String::as_str)
        .filter(|w| !is_verb(w))
        .collect();
    let singular = resource_words.last().is_some_and(|w| !w.ends_with('s'));
    let resource = pluralize(&resource_words.join("_"));

    let mut path = if resource.is_empty() {
        String::new()
    } else {
        format!("/{resource}")
    };
    let mut template_params = Vec::new();

    if !key_words.is_empty() {
        let key = key_words.join("_");
        path.push_str(&format!("/{{{key}}}"));
        template_params.push(key);
    } else {
        let properties = tool.property_names();
        let wants_id = match method {
            HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete => true,
            HttpMethod::Get => singular,
            HttpMethod::Post => false,
        };
        if wants_id && properties.contains(&"id") {
            path.push_str("/{id}");
            template_params.push("id".to_string());
        }
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut template = CallTemplate::new(method, path).inferred();
    for param in &template_params {
        template = template.with_path_param(param, param);
    }
    if method == HttpMethod::Get {
        template = template.with_query_params();
    }
    if method.allows_body() {
        template = template.with_body();
    }
    template
}

fn infer_method(words: &[String]) -> HttpMethod {
    let has = |verbs: &[&str]| words.iter().any(|w| verbs.contains(&w.as_str()));
    if has(DELETE_VERBS) {
        HttpMethod::Delete
    } else if has(PATCH_VERBS) {
        HttpMethod::Patch
    } else if has(PUT_VERBS) {
        HttpMethod::Put
    } else if has(POST_VERBS) {
        HttpMethod::Post
    } else {
        HttpMethod::Get
    }
}

fn is_verb(word: &str) -> bool {
    [POST_VERBS, PUT_VERBS, PATCH_VERBS, DELETE_VERBS, READ_VERBS]
        .iter()
        .any(|verbs| verbs.contains(&word))
}

/// Split snake_case, kebab-case and camelCase into lowercase words
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == '.' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn pluralize(resource: &str) -> String {
    if resource.is_empty() || resource.ends_with('s') {
        return resource.to_string();
    }
    if let Some(stem) = resource.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    format!("{resource}s")
}
