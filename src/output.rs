//! Rendering of backend responses for the terminal.
//!
//! `--json` always wins and pretty-prints the body. Otherwise the
//! operation's output hint picks a table (arrays) or aligned key/value
//! lines (objects). Bodies that do not match the hint are printed as-is.

use std::io::{self, Write};

use serde_json::{Map, Value};

use crate::manifest::{OutputKind, OutputSpec};

/// Response formatter for one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    json: bool,
}

impl Formatter {
    /// Creates a formatter; `json` forces pretty JSON output.
    #[must_use]
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Renders `body` according to the mode and hint.
    #[must_use]
    pub fn render(&self, body: &[u8], hint: Option<&OutputSpec>) -> String {
        if self.json {
            return pretty_json(body);
        }

        let raw = || String::from_utf8_lossy(body).into_owned();
        let Some(kind) = hint.and_then(|h| h.kind) else {
            return raw();
        };
        let fields = hint.map(|h| h.fields.as_slice()).unwrap_or_default();

        match (kind, serde_json::from_slice::<Value>(body)) {
            (OutputKind::Array, Ok(Value::Array(items))) => {
                let rows: Option<Vec<&Map<String, Value>>> =
                    items.iter().map(Value::as_object).collect();
                rows.map_or_else(raw, |rows| render_table(&rows, fields))
            }
            (OutputKind::Object, Ok(Value::Object(item))) => render_object(&item, fields),
            _ => raw(),
        }
    }

    /// Writes the rendered body followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write<W: Write>(
        &self,
        out: &mut W,
        body: &[u8],
        hint: Option<&OutputSpec>,
    ) -> io::Result<()> {
        let rendered = self.render(body, hint);
        writeln!(out, "{}", rendered.trim_end_matches('\n'))
    }
}

/// Pretty-prints `body` as JSON, or returns it unchanged when it is not JSON.
#[must_use]
pub fn pretty_json(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

/// Renders a single JSON value as a table cell.
#[must_use]
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)] // only when the value is integral and in range
fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn column_names(rows: &[&Map<String, Value>], fields: &[String]) -> Vec<String> {
    if fields.is_empty() {
        rows.first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default()
    } else {
        fields.to_vec()
    }
}

fn render_table(rows: &[&Map<String, Value>], fields: &[String]) -> String {
    if rows.is_empty() {
        return "No items found".to_string();
    }

    let columns = column_names(rows, fields);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(format_value).unwrap_or_default())
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |values: &mut dyn Iterator<Item = String>| {
        values
            .zip(widths.iter().copied())
            .map(|(v, w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header = line(&mut columns.iter().map(|c| c.to_uppercase()));
    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(header.chars().count()));
    for row in cells {
        out.push('\n');
        out.push_str(&line(&mut row.into_iter()));
    }
    out
}

fn render_object(item: &Map<String, Value>, fields: &[String]) -> String {
    let keys: Vec<String> = if fields.is_empty() {
        item.keys().cloned().collect()
    } else {
        fields.to_vec()
    };
    let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);

    keys.iter()
        .map(|k| {
            let value = item.get(k).map(format_value).unwrap_or_default();
            format!("{k:<width$}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(kind: OutputKind, fields: &[&str]) -> OutputSpec {
        OutputSpec {
            kind: Some(kind),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    #[test]
    fn json_mode_pretty_prints() {
        let out = Formatter::new(true).render(br#"{"a":1}"#, None);
        assert_eq!(out, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn json_mode_passes_through_non_json() {
        assert_eq!(Formatter::new(true).render(b"plain", None), "plain");
    }

    #[test]
    fn array_renders_table() {
        let body = br#"[{"name":"db","replicas":3},{"name":"cache-long","replicas":1.0}]"#;
        let out = Formatter::new(false).render(body, Some(&hint(OutputKind::Array, &["name", "replicas"])));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "NAME        REPLICAS");
        assert_eq!(lines[1], "-".repeat(lines[0].len()));
        assert_eq!(lines[2], "db          3");
        assert_eq!(lines[3], "cache-long  1");
    }

    #[test]
    fn empty_array_says_so() {
        let out = Formatter::new(false).render(b"[]", Some(&hint(OutputKind::Array, &[])));
        assert_eq!(out, "No items found");
    }

    #[test]
    fn object_renders_aligned_pairs() {
        let body = br#"{"id":"c1","status":"ready","tags":["a","b"],"meta":{"x":1}}"#;
        let out = Formatter::new(false).render(body, Some(&hint(OutputKind::Object, &[])));
        assert_eq!(
            out,
            "id    : c1\nstatus: ready\ntags  : a, b\nmeta  : {\"x\":1}"
        );
    }

    #[test]
    fn mismatched_body_falls_back_to_raw() {
        let out = Formatter::new(false).render(br#"{"a":1}"#, Some(&hint(OutputKind::Array, &[])));
        assert_eq!(out, r#"{"a":1}"#);
        let out = Formatter::new(false).render(b"ok", Some(&hint(OutputKind::Raw, &[])));
        assert_eq!(out, "ok");
    }

    #[test]
    fn null_values_render_empty() {
        assert_eq!(format_value(&Value::Null), "");
        assert_eq!(format_value(&serde_json::json!(2.5)), "2.5");
    }
}
