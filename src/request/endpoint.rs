//! Endpoint template placeholders.
//!
//! Two placeholder styles are accepted and may be mixed in one template:
//! bracket style (`{name}`) and colon style (`:name`). A colon placeholder
//! only matches a whole identifier, so `:cid` never rewrites `:cidr`.

use std::collections::HashMap;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `rest` (text after a `:`) starts with `name` as a whole identifier.
fn colon_matches(rest: &str, name: &str) -> bool {
    rest.strip_prefix(name)
        .is_some_and(|after| !after.starts_with(is_ident_char))
}

/// Whether `template` contains a placeholder for `name` in either style.
#[must_use]
pub fn has_placeholder(template: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if template.contains(&format!("{{{name}}}")) {
        return true;
    }
    template
        .match_indices(':')
        .any(|(i, _)| colon_matches(&template[i + 1..], name))
}

/// Replaces every placeholder named in `values`, in a single pass.
///
/// Placeholders with no entry are left untouched, and substituted text is
/// never re-scanned.
#[must_use]
pub fn render(template: &str, values: &HashMap<&str, String>) -> String {
    // Longest names first so `:cluster_id` wins over `:cluster`.
    let mut names: Vec<&str> = values.keys().copied().collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == ':') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        let matched = if rest[pos..].starts_with('{') {
            tail.find('}').and_then(|end| {
                let name = &tail[..end];
                values.get(name).map(|v| (v, end + 1))
            })
        } else {
            names
                .iter()
                .find(|name| colon_matches(tail, name))
                .map(|name| (&values[name], name.len()))
        };

        match matched {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push_str(&rest[pos..=pos]);
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}
