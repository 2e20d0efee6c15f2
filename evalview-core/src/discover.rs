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

//! Column discovery
//!
//! Builds the catalog of addressable columns for a batch of rows:
//!
//! 1. fixed row columns (`created_at`, `id`, feedback counters, `tags`)
//! 2. per-span columns, depth-first through the trace tree: `duration`,
//!    `error`, and the keys of `input_data` / `output_data` / `meta_info`
//!    expanded up to a configurable depth
//! 3. one feedback column per distinct (field, user, feedback type)
//!
//! Every helper returns its own list; the caller concatenates and
//! deduplicates by path, keeping the first occurrence.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::model::{ColumnKind, ExpandedColumn, Row, Span};

/// Default expansion depth for span payload objects
pub const DEFAULT_DEPTH: usize = 2;

/// Independent expansion limits for the three span payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDepths {
    #[serde(default = "default_depth")]
    pub input: usize,
    #[serde(default = "default_depth")]
    pub output: usize,
    #[serde(default = "default_depth")]
    pub meta: usize,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

impl Default for DiscoveryDepths {
    fn default() -> Self {
        Self {
            input: DEFAULT_DEPTH,
            output: DEFAULT_DEPTH,
            meta: DEFAULT_DEPTH,
        }
    }
}

impl DiscoveryDepths {
    pub fn uniform(depth: usize) -> Self {
        Self {
            input: depth,
            output: depth,
            meta: depth,
        }
    }
}

/// Columns that stay in every selection regardless of the stored schema
pub fn persistent_columns() -> Vec<ExpandedColumn> {
    vec![ExpandedColumn::regular("created_at", "Created", ColumnKind::Info)]
}

/// Row-level fields available for every experiment
pub fn base_row_columns() -> Vec<ExpandedColumn> {
    vec![
        ExpandedColumn::regular("id", "row > Row ID", ColumnKind::Info),
        ExpandedColumn::regular("feedback_count", "row > Feedback", ColumnKind::Info),
        ExpandedColumn::regular("feedback_assigned", "row > Assigned", ColumnKind::Info),
        ExpandedColumn::regular("tags", "row > Tags", ColumnKind::Info),
    ]
}

pub fn is_base_row_path(path: &str) -> bool {
    matches!(path, "id" | "feedback_count" | "feedback_assigned" | "tags")
}

/// Discover every addressable column for `rows`.
pub fn discover(rows: &[Row], depths: DiscoveryDepths) -> Vec<ExpandedColumn> {
    let mut candidates = persistent_columns();
    candidates.extend(base_row_columns());

    for row in rows {
        for (index, span) in row.spans.iter().enumerate() {
            let base_path = format!("spans[{}]", index);
            candidates.extend(span_columns(span, &base_path, span_name(span), depths));
        }
    }

    candidates.extend(feedback_columns(rows));

    let columns = dedup_by_path(candidates);
    debug!(
        rows = rows.len(),
        columns = columns.len(),
        "Discovered experiment columns"
    );
    columns
}

fn span_name(span: &Span) -> &str {
    if span.name.is_empty() {
        "Unnamed Span"
    } else {
        &span.name
    }
}

fn span_columns(
    span: &Span,
    base_path: &str,
    base_label: &str,
    depths: DiscoveryDepths,
) -> Vec<ExpandedColumn> {
    let mut columns = Vec::new();

    if span.duration.is_some() {
        columns.push(ExpandedColumn::regular(
            format!("{}.duration", base_path),
            format!("{} > duration", base_label),
            ColumnKind::Duration,
        ));
    }
    if span.error.is_some() {
        columns.push(ExpandedColumn::regular(
            format!("{}.error", base_path),
            format!("{} > error", base_label),
            ColumnKind::Error,
        ));
    }

    columns.extend(payload_columns(
        &span.input_data,
        &format!("{}.input_data", base_path),
        &format!("{} Input", base_label),
        ColumnKind::Input,
        0,
        depths.input,
    ));
    columns.extend(payload_columns(
        &span.output_data,
        &format!("{}.output_data", base_path),
        &format!("{} Output", base_label),
        ColumnKind::Output,
        0,
        depths.output,
    ));
    columns.extend(payload_columns(
        &span.meta_info,
        &format!("{}.meta_info", base_path),
        &format!("{} Meta", base_label),
        ColumnKind::Info,
        0,
        depths.meta,
    ));

    for (index, child) in span.children.iter().enumerate() {
        let child_path = format!("{}.children[{}]", base_path, index);
        let child_label = format!("{} > {}", base_label, span_name(child));
        columns.extend(span_columns(child, &child_path, &child_label, depths));
    }

    columns
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Columns for one span payload. Objects are expanded key by key while
/// `depth < max_depth`; any other non-empty payload is a single leaf.
fn payload_columns(
    value: &Value,
    prefix: &str,
    label: &str,
    kind: ColumnKind,
    depth: usize,
    max_depth: usize,
) -> Vec<ExpandedColumn> {
    let map = match value {
        Value::Object(map) => map,
        leaf if is_falsy(leaf) => return Vec::new(),
        _ => {
            return vec![ExpandedColumn::regular(
                prefix,
                format!("{} > value", label),
                kind,
            )]
        }
    };

    if depth >= max_depth {
        return Vec::new();
    }

    let mut columns = Vec::new();
    for (key, nested) in map {
        let path = format!("{}.{}", prefix, key);
        let field_label = format!("{} > {}", label, key);
        columns.push(ExpandedColumn::regular(&path, &field_label, kind));

        if nested.is_object() {
            columns.extend(payload_columns(
                nested,
                &path,
                &field_label,
                kind,
                depth + 1,
                max_depth,
            ));
        }
    }
    columns
}

/// One column per distinct (field, user, feedback type) seen in the batch
pub fn feedback_columns(rows: &[Row]) -> Vec<ExpandedColumn> {
    let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
    let mut columns = Vec::new();

    for feedback in rows.iter().flat_map(|row| row.feedbacks.iter()) {
        for field_key in feedback.feedback.keys() {
            let triple = (field_key.as_str(), feedback.user(), feedback.kind());
            if seen.insert(triple) {
                columns.push(ExpandedColumn::feedback(
                    field_key.as_str(),
                    feedback.user(),
                    feedback.kind(),
                ));
            }
        }
    }
    columns
}

fn dedup_by_path(candidates: Vec<ExpandedColumn>) -> Vec<ExpandedColumn> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|column| seen.insert(column.path().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn paths(columns: &[ExpandedColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.path()).collect()
    }

    #[test]
    fn test_fixed_columns_without_rows() {
        let columns = discover(&[], DiscoveryDepths::default());
        assert_eq!(
            paths(&columns),
            vec!["created_at", "id", "feedback_count", "feedback_assigned", "tags"]
        );
    }

    #[test]
    fn test_span_columns_and_children() {
        let rows = vec![row(json!({
            "id": "r1",
            "spans": [{
                "name": "pipeline",
                "duration": 2.0,
                "input_data": {"question": "why?"},
                "children": [{
                    "name": "llm",
                    "duration": 1.0,
                    "error": "timeout",
                    "output_data": "plain text answer"
                }]
            }]
        }))];

        let columns = discover(&rows, DiscoveryDepths::default());
        let found = paths(&columns);

        assert!(found.contains(&"spans[0].duration"));
        assert!(found.contains(&"spans[0].input_data.question"));
        assert!(found.contains(&"spans[0].children[0].duration"));
        assert!(found.contains(&"spans[0].children[0].error"));
        assert!(found.contains(&"spans[0].children[0].output_data"));

        let leaf = columns
            .iter()
            .find(|c| c.path() == "spans[0].children[0].output_data")
            .unwrap();
        assert_eq!(leaf.label(), "pipeline > llm Output > value");

        let error = columns
            .iter()
            .find(|c| c.path() == "spans[0].children[0].error")
            .unwrap();
        assert_eq!(error.label(), "pipeline > llm > error");
    }

    #[test]
    fn test_depth_limit_stops_expansion() {
        let rows = vec![row(json!({
            "id": "r1",
            "spans": [{
                "name": "s",
                "input_data": {"a": {"b": {"c": 1}}, "list": [1, 2]}
            }]
        }))];

        let shallow = discover(&rows, DiscoveryDepths::uniform(1));
        let shallow_paths = paths(&shallow);
        assert!(shallow_paths.contains(&"spans[0].input_data.a"));
        assert!(shallow_paths.contains(&"spans[0].input_data.list"));
        assert!(!shallow_paths.contains(&"spans[0].input_data.a.b"));

        let default = discover(&rows, DiscoveryDepths::default());
        let default_paths = paths(&default);
        assert!(default_paths.contains(&"spans[0].input_data.a.b"));
        assert!(!default_paths.contains(&"spans[0].input_data.a.b.c"));
        assert!(!default_paths.iter().any(|p| p.starts_with("spans[0].input_data.list.")));
    }

    #[test]
    fn test_falsy_payloads_skipped() {
        let rows = vec![row(json!({
            "id": "r1",
            "spans": [{"name": "s", "input_data": "", "output_data": null, "meta_info": 0}]
        }))];
        let columns = discover(&rows, DiscoveryDepths::default());
        assert_eq!(columns.len(), 5);
    }

    #[test]
    fn test_first_label_wins_for_shared_paths() {
        let rows = vec![
            row(json!({"id": "r1", "spans": [{"name": "first", "duration": 1.0}]})),
            row(json!({"id": "r2", "spans": [{"name": "second", "duration": 3.0}]})),
        ];
        let columns = discover(&rows, DiscoveryDepths::default());
        let durations: Vec<_> = columns
            .iter()
            .filter(|c| c.path() == "spans[0].duration")
            .collect();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].label(), "first > duration");
    }

    #[test]
    fn test_feedback_triples() {
        let rows = vec![
            row(json!({
                "id": "r1",
                "feedbacks": [
                    {"id": "f1", "timestamp": "t", "user_id": "alice", "feedback_type": "review",
                     "feedback": {"accuracy": 1, "notes": "ok"}},
                    {"id": "f2", "timestamp": "t", "user_id": "alice", "feedback_type": "review",
                     "feedback": {"accuracy": 0}}
                ]
            })),
            row(json!({
                "id": "r2",
                "feedbacks": [
                    {"id": "f3", "timestamp": "t", "feedback": {"accuracy": 1}}
                ]
            })),
        ];

        let columns = feedback_columns(&rows);
        assert_eq!(
            paths(&columns),
            vec![
                "feedbacks.review.alice.accuracy",
                "feedbacks.review.alice.notes",
                "feedbacks.Unknown.Unknown.accuracy",
            ]
        );
    }
}
