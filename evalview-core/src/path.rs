// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dotted path resolution over untyped JSON
//!
//! Paths look like `spans[0].children[2].output_data.answer`. Every
//! segment is either a plain key or a key followed by a bracketed array
//! index. Resolution never fails loudly: a missing key, a null along the
//! way, an index into a non-array or an index past the end all yield
//! "no value".

use serde_json::Value;

/// One parsed path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Indexed(&'a str, usize),
}

fn parse_segment(part: &str) -> Segment<'_> {
    if let Some(body) = part.strip_suffix(']') {
        if let Some(open) = body.rfind('[') {
            let (name, index) = (&body[..open], &body[open + 1..]);
            if !name.is_empty() && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(index) = index.parse::<usize>() {
                    return Segment::Indexed(name, index);
                }
            }
        }
    }
    Segment::Key(part)
}

fn lookup<'v>(current: &'v Value, key: &str) -> Option<&'v Value> {
    match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Resolve `path` against `root`, returning the raw value.
///
/// `None` covers every flavour of "nothing there", including an explicit
/// JSON null at the end of the path.
pub fn resolve<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = root;
    for part in path.split('.') {
        if current.is_null() {
            return None;
        }
        current = match parse_segment(part) {
            Segment::Key(key) => lookup(current, key)?,
            Segment::Indexed(name, index) => match lookup(current, name)? {
                Value::Array(items) => items.get(index)?,
                _ => return None,
            },
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Render a resolved value the way table cells show it
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Whole floats print without a fractional part: `2.0` shows as `2`
fn display_number(n: &serde_json::Number) -> String {
    if n.is_f64() {
        if let Some(v) = n.as_f64() {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                return format!("{}", v as i64);
            }
        }
    }
    n.to_string()
}

/// Table variant of [`resolve`]: absent values become an empty string and
/// structured values are serialized to compact JSON.
pub fn resolve_display(root: &Value, path: &str) -> String {
    resolve(root, path).map(display_value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "row-1",
            "tags": ["a", "b"],
            "spans": [
                {
                    "name": "root",
                    "duration": 1.25,
                    "output_data": {"answer": "42", "scores": {"f1": 0.9}},
                    "children": [
                        {"name": "child", "error": "boom", "input_data": null}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_resolve_nested_indexed_path() {
        let row = sample();
        assert_eq!(
            resolve(&row, "spans[0].output_data.answer"),
            Some(&json!("42"))
        );
        assert_eq!(
            resolve(&row, "spans[0].children[0].error"),
            Some(&json!("boom"))
        );
        assert_eq!(resolve(&row, "spans[0].output_data.scores.f1"), Some(&json!(0.9)));
    }

    #[test]
    fn test_missing_segments_are_absent() {
        let row = sample();
        assert_eq!(resolve(&row, "spans[3].duration"), None);
        assert_eq!(resolve(&row, "spans[0].children[0].input_data.x"), None);
        assert_eq!(resolve(&row, "nope.deeper"), None);
        assert_eq!(resolve(&row, "id[0]"), None);
        assert_eq!(resolve(&row, ""), None);
    }

    #[test]
    fn test_plain_numeric_segment_indexes_arrays() {
        let row = sample();
        assert_eq!(resolve(&row, "tags.1"), Some(&json!("b")));
        assert_eq!(resolve(&row, "tags.x"), None);
    }

    #[test]
    fn test_display_variant() {
        let row = sample();
        assert_eq!(resolve_display(&row, "spans[0].duration"), "1.25");
        assert_eq!(resolve_display(&row, "tags"), r#"["a","b"]"#);
        assert_eq!(
            resolve_display(&row, "spans[0].output_data.scores"),
            r#"{"f1":0.9}"#
        );
        assert_eq!(resolve_display(&row, "spans[0].output_data.answer"), "42");
        assert_eq!(resolve_display(&row, "missing"), "");
    }

    #[test]
    fn test_whole_floats_display_as_integers() {
        assert_eq!(display_value(&json!(2.0)), "2");
        assert_eq!(display_value(&json!(-3.0)), "-3");
        assert_eq!(display_value(&json!(0.0)), "0");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!(7)), "7");
    }

    #[test]
    fn test_malformed_brackets_treated_as_keys() {
        let row = json!({"a[": 1, "b[x]": 2, "[0]": 3});
        assert_eq!(resolve(&row, "a["), Some(&json!(1)));
        assert_eq!(resolve(&row, "b[x]"), Some(&json!(2)));
        assert_eq!(resolve(&row, "[0]"), Some(&json!(3)));
    }
}
