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

//! Column projection
//!
//! Evaluates selected columns against rows. Regular columns go through
//! the path resolver, feedback columns through the aggregator; feedback
//! paths are identity keys and are never resolved as paths.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::aggregate::{aggregate, AggregatedFeedback};
use crate::model::{ColumnKind, ExpandedColumn, FeedbackGrouping, Row};
use crate::path::{display_value, resolve};

/// Group selector meaning "no grouping"
pub const NO_GROUP: &str = "_none";

/// A projected value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Absent,
    Value(Value),
    /// Every matching feedback value under the `none` grouping
    List(Vec<Value>),
}

impl Cell {
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    /// Table text: empty when absent, one line per listed value
    pub fn display(&self) -> String {
        match self {
            Cell::Absent => String::new(),
            Cell::Value(v) => display_value(v),
            Cell::List(values) => values
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Text used when the cell names a group
    pub fn group_key(&self) -> String {
        match self {
            Cell::List(values) => values
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(","),
            other => other.display(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Option<AggregatedFeedback>> for Cell {
    fn from(aggregated: Option<AggregatedFeedback>) -> Self {
        match aggregated {
            None => Cell::Absent,
            Some(AggregatedFeedback::All(values)) => Cell::List(values),
            Some(AggregatedFeedback::Latest(Value::Null)) => Cell::Absent,
            Some(AggregatedFeedback::Latest(value)) => Cell::Value(value),
            Some(AggregatedFeedback::Mean(mean)) => Cell::Value(Value::from(mean)),
        }
    }
}

/// A row paired with its JSON view, so a record projects several
/// regular columns without re-serializing the row each time.
pub struct RowView<'r> {
    row: &'r Row,
    value: Value,
}

impl<'r> RowView<'r> {
    pub fn new(row: &'r Row) -> Self {
        Self {
            row,
            value: row.to_value(),
        }
    }

    pub fn row(&self) -> &'r Row {
        self.row
    }

    pub fn project(&self, column: &ExpandedColumn, grouping: FeedbackGrouping) -> Cell {
        match column {
            ExpandedColumn::Regular(c) => resolve(&self.value, &c.path)
                .cloned()
                .map(Cell::Value)
                .unwrap_or(Cell::Absent),
            ExpandedColumn::Feedback(c) => aggregate(
                self.row,
                &c.field_key,
                &c.user_id,
                &c.feedback_type,
                grouping,
            )
            .into(),
        }
    }
}

/// Evaluate one column against one row
pub fn project(row: &Row, column: &ExpandedColumn, grouping: FeedbackGrouping) -> Cell {
    match column {
        ExpandedColumn::Feedback(_) => RowView {
            row,
            value: Value::Null,
        }
        .project(column, grouping),
        ExpandedColumn::Regular(_) => RowView::new(row).project(column, grouping),
    }
}

/// Flat record for one row over a column selection, in selection order
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub row_id: String,
    pub cells: Vec<(String, Cell)>,
}

impl Projection {
    pub fn get(&self, path: &str) -> Option<&Cell> {
        self.cells.iter().find(|(p, _)| p == path).map(|(_, c)| c)
    }

    /// `{ "<path>": <value>, ... }` with absent cells as null
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (path, cell) in &self.cells {
            map.insert(
                path.clone(),
                serde_json::to_value(cell).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

pub fn project_row(row: &Row, columns: &[ExpandedColumn], grouping: FeedbackGrouping) -> Projection {
    let view = RowView::new(row);
    Projection {
        row_id: row.id.clone(),
        cells: columns
            .iter()
            .map(|column| (column.path().to_string(), view.project(column, grouping)))
            .collect(),
    }
}

pub fn project_rows(
    rows: &[Row],
    columns: &[ExpandedColumn],
    grouping: FeedbackGrouping,
) -> Vec<Projection> {
    rows.iter()
        .map(|row| project_row(row, columns, grouping))
        .collect()
}

/// Look a selector up in the active columns. Unknown selectors are taken
/// as plain row paths.
pub fn column_for(path: &str, columns: &[ExpandedColumn]) -> ExpandedColumn {
    columns
        .iter()
        .find(|c| c.path() == path)
        .cloned()
        .unwrap_or_else(|| ExpandedColumn::regular(path, path, ColumnKind::Info))
}

/// Rows that share a group key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowGroup<'r> {
    pub name: String,
    pub rows: Vec<&'r Row>,
}

/// Partition rows by the values of up to two selector columns.
///
/// Empty and `_none` selectors are ignored; with no selector left every
/// row lands in one group named `""`. Empty sub-keys are dropped and the
/// rest joined with `" - "`. Groups keep first-seen order.
pub fn group_rows<'r>(
    rows: &'r [Row],
    group_by: &[String],
    columns: &[ExpandedColumn],
    grouping: FeedbackGrouping,
) -> Vec<RowGroup<'r>> {
    let selectors: Vec<ExpandedColumn> = group_by
        .iter()
        .filter(|s| !s.is_empty() && s.as_str() != NO_GROUP)
        .map(|s| column_for(s, columns))
        .collect();

    if selectors.is_empty() {
        return vec![RowGroup {
            name: String::new(),
            rows: rows.iter().collect(),
        }];
    }

    let mut groups: Vec<RowGroup<'r>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let view = RowView::new(row);
        let name = selectors
            .iter()
            .map(|column| view.project(column, grouping).group_key())
            .filter(|key| !key.is_empty())
            .collect::<Vec<_>>()
            .join(" - ");

        match index.get(&name) {
            Some(&i) => groups[i].rows.push(row),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push(RowGroup {
                    name,
                    rows: vec![row],
                });
            }
        }
    }

    debug!(
        rows = rows.len(),
        groups = groups.len(),
        "Grouped rows by {} selector(s)",
        selectors.len()
    );
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XyPoint {
    pub x: Cell,
    pub y: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XySeries {
    pub group_name: String,
    pub points: Vec<XyPoint>,
}

/// Paired (x, y) values per group for scatter and line plots. Points with
/// either side absent are dropped.
pub fn xy_series(
    rows: &[Row],
    x: &ExpandedColumn,
    y: &ExpandedColumn,
    group_by: &[String],
    columns: &[ExpandedColumn],
    grouping: FeedbackGrouping,
) -> Vec<XySeries> {
    group_rows(rows, group_by, columns, grouping)
        .into_iter()
        .map(|group| XySeries {
            points: group
                .rows
                .iter()
                .filter_map(|row| {
                    let view = RowView::new(row);
                    let point = XyPoint {
                        x: view.project(x, grouping),
                        y: view.project(y, grouping),
                    };
                    (!point.x.is_absent() && !point.y.is_absent()).then_some(point)
                })
                .collect(),
            group_name: group.name,
        })
        .collect()
}
