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

//! Table column typing, filtering and sorting

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::coerce::{is_strict_number, parse_date};
use crate::model::{ExpandedColumn, FeedbackGrouping, Row};
use crate::projection::RowView;

/// Inferred type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Date,
    String,
}

/// Infer how a column's values should be compared.
///
/// Counters are numbers and tags are text regardless of content. Other
/// columns are numbers when every non-empty value is numeric, dates when
/// every one parses as a date, and text otherwise.
pub fn infer_data_type<'r, I>(column: &ExpandedColumn, rows: I, grouping: FeedbackGrouping) -> DataType
where
    I: IntoIterator<Item = &'r Row>,
{
    match column.path() {
        "feedback_count" | "feedback_assigned" => return DataType::Number,
        "tags" => return DataType::String,
        _ => {}
    }

    let values: Vec<String> = rows
        .into_iter()
        .map(|row| RowView::new(row).project(column, grouping).display())
        .filter(|text| !text.is_empty())
        .collect();

    if values.is_empty() {
        DataType::String
    } else if values.iter().all(|v| is_strict_number(v)) {
        DataType::Number
    } else if values.iter().all(|v| parse_date(v).is_some()) {
        DataType::Date
    } else {
        DataType::String
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "on")]
    On,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::Contains => "contains",
            FilterOperator::Eq => "=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::On => "on",
            FilterOperator::Before => "before",
            FilterOperator::After => "after",
        }
    }

    /// Column type this operator compares as
    pub fn data_type(&self) -> DataType {
        match self {
            FilterOperator::Equals | FilterOperator::Contains => DataType::String,
            FilterOperator::On | FilterOperator::Before | FilterOperator::After => DataType::Date,
            _ => DataType::Number,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equals" => Ok(FilterOperator::Equals),
            "contains" => Ok(FilterOperator::Contains),
            "=" | "==" => Ok(FilterOperator::Eq),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            ">=" => Ok(FilterOperator::Gte),
            "<=" => Ok(FilterOperator::Lte),
            "on" => Ok(FilterOperator::On),
            "before" => Ok(FilterOperator::Before),
            "after" => Ok(FilterOperator::After),
            other => Err(format!("Unknown filter operator: {}", other)),
        }
    }
}

/// A filter on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: ExpandedColumn,
    pub operator: FilterOperator,
    pub value: String,
}

impl ColumnFilter {
    pub fn new(column: ExpandedColumn, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            column,
            operator,
            value: value.into(),
        }
    }

    /// Test a displayed cell. Empty cells never match.
    pub fn matches_text(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        match self.operator {
            FilterOperator::Equals => text.to_lowercase() == self.value.to_lowercase(),
            FilterOperator::Contains => text.to_lowercase().contains(&self.value.to_lowercase()),
            FilterOperator::Eq | FilterOperator::Gt | FilterOperator::Lt | FilterOperator::Gte | FilterOperator::Lte => {
                let (Some(lhs), Some(rhs)) = (strict_number(text), strict_number(&self.value)) else {
                    return false;
                };
                match self.operator {
                    FilterOperator::Eq => lhs == rhs,
                    FilterOperator::Gt => lhs > rhs,
                    FilterOperator::Lt => lhs < rhs,
                    FilterOperator::Gte => lhs >= rhs,
                    _ => lhs <= rhs,
                }
            }
            FilterOperator::On | FilterOperator::Before | FilterOperator::After => {
                let (Some(lhs), Some(rhs)) = (parse_date(text), parse_date(&self.value)) else {
                    return false;
                };
                match self.operator {
                    FilterOperator::On => lhs == rhs,
                    FilterOperator::Before => lhs < rhs,
                    _ => lhs > rhs,
                }
            }
        }
    }

    pub fn matches(&self, view: &RowView<'_>, grouping: FeedbackGrouping) -> bool {
        self.matches_text(&view.project(&self.column, grouping).display())
    }
}

fn strict_number(s: &str) -> Option<f64> {
    if is_strict_number(s) {
        s.trim().parse().ok()
    } else {
        None
    }
}

/// Rows passing every filter, in input order
pub fn filter_rows<'r>(
    rows: &'r [Row],
    filters: &[ColumnFilter],
    grouping: FeedbackGrouping,
) -> Vec<&'r Row> {
    rows.iter()
        .filter(|row| {
            let view = RowView::new(row);
            filters.iter().all(|f| f.matches(&view, grouping))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(format!("Unknown sort order: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Number(f64),
    Date(i64),
    Text(String),
}

fn sort_key(text: String, data_type: DataType) -> Option<SortKey> {
    if text.is_empty() {
        return None;
    }
    Some(match data_type {
        DataType::Number => match strict_number(&text) {
            Some(n) => SortKey::Number(n),
            None => SortKey::Text(text),
        },
        DataType::Date => match parse_date(&text) {
            Some(dt) => SortKey::Date(dt.timestamp_micros()),
            None => SortKey::Text(text),
        },
        DataType::String => SortKey::Text(text),
    })
}

/// Stable sort on one column. Absent values go last in either order.
pub fn sort_rows<'r>(
    rows: Vec<&'r Row>,
    column: &ExpandedColumn,
    grouping: FeedbackGrouping,
    order: SortOrder,
) -> Vec<&'r Row> {
    let data_type = infer_data_type(column, rows.iter().copied(), grouping);

    let mut keyed: Vec<(Option<SortKey>, &'r Row)> = rows
        .into_iter()
        .map(|row| {
            let text = RowView::new(row).project(column, grouping).display();
            (sort_key(text, data_type), row)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        }
    });

    keyed.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnKind;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        serde_json::from_value(json!([
            {"id": "r1", "created_at": "2024-03-01T10:00:00Z", "feedback_count": 2,
             "output_data": {"score": "10", "answer": "Paris"}},
            {"id": "r2", "created_at": "2024-03-03T10:00:00Z", "feedback_count": 0,
             "output_data": {"score": "9.5", "answer": "paris, France"}},
            {"id": "r3", "created_at": "2024-03-02T10:00:00Z", "feedback_count": 1,
             "output_data": {"answer": "Lyon"}}
        ]))
        .unwrap()
    }

    fn col(path: &str) -> ExpandedColumn {
        ExpandedColumn::regular(path, path, ColumnKind::Info)
    }

    fn ids(rows: &[&Row]) -> Vec<String> {
        rows.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_infer_data_type() {
        let rows = rows();
        let g = FeedbackGrouping::None;
        assert_eq!(infer_data_type(&col("feedback_count"), &rows, g), DataType::Number);
        assert_eq!(infer_data_type(&col("tags"), &rows, g), DataType::String);
        assert_eq!(infer_data_type(&col("output_data.score"), &rows, g), DataType::Number);
        assert_eq!(infer_data_type(&col("created_at"), &rows, g), DataType::Date);
        assert_eq!(infer_data_type(&col("output_data.answer"), &rows, g), DataType::String);
        assert_eq!(infer_data_type(&col("missing"), &rows, g), DataType::String);
    }

    #[test]
    fn test_string_filters_ignore_case() {
        let rows = rows();
        let equals = ColumnFilter::new(col("output_data.answer"), FilterOperator::Equals, "PARIS");
        assert_eq!(ids(&filter_rows(&rows, &[equals], FeedbackGrouping::None)), vec!["r1"]);

        let contains = ColumnFilter::new(col("output_data.answer"), FilterOperator::Contains, "paris");
        assert_eq!(
            ids(&filter_rows(&rows, &[contains], FeedbackGrouping::None)),
            vec!["r1", "r2"]
        );
    }

    #[test]
    fn test_number_and_date_filters() {
        let rows = rows();
        let g = FeedbackGrouping::None;

        let gte = ColumnFilter::new(col("output_data.score"), FilterOperator::Gte, "9.5");
        assert_eq!(ids(&filter_rows(&rows, &[gte], g)), vec!["r1", "r2"]);

        let lt = ColumnFilter::new(col("feedback_count"), FilterOperator::Lt, "1");
        assert_eq!(ids(&filter_rows(&rows, &[lt], g)), vec!["r2"]);

        let bad = ColumnFilter::new(col("output_data.score"), FilterOperator::Gt, "lots");
        assert!(filter_rows(&rows, &[bad], g).is_empty());

        let after = ColumnFilter::new(col("created_at"), FilterOperator::After, "2024-03-01 12:00:00");
        assert_eq!(ids(&filter_rows(&rows, &[after.clone()], g)), vec!["r2", "r3"]);

        let before = ColumnFilter::new(col("created_at"), FilterOperator::Before, "2024-03-03");
        assert_eq!(ids(&filter_rows(&rows, &[after, before], g)), vec!["r3"]);
    }

    #[test]
    fn test_sort_rows() {
        let rows = rows();
        let g = FeedbackGrouping::None;
        let all: Vec<&Row> = rows.iter().collect();

        let by_score = sort_rows(all.clone(), &col("output_data.score"), g, SortOrder::Asc);
        assert_eq!(ids(&by_score), vec!["r2", "r1", "r3"]);

        let by_score_desc = sort_rows(all.clone(), &col("output_data.score"), g, SortOrder::Desc);
        assert_eq!(ids(&by_score_desc), vec!["r1", "r2", "r3"]);

        let by_date = sort_rows(all, &col("created_at"), g, SortOrder::Desc);
        assert_eq!(ids(&by_date), vec!["r2", "r3", "r1"]);
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(">=".parse::<FilterOperator>().unwrap(), FilterOperator::Gte);
        assert_eq!("Contains".parse::<FilterOperator>().unwrap(), FilterOperator::Contains);
        assert!("like".parse::<FilterOperator>().is_err());
        assert_eq!(FilterOperator::Before.data_type(), DataType::Date);
    }
}
