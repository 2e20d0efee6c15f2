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

//! Equal-width histograms over a projected column

use serde::Serialize;
use serde_json::Value;

use crate::coerce::{lenient_number, millis_to_iso, parse_date_millis};
use crate::model::{ExpandedColumn, FeedbackGrouping, Row};
use crate::projection::{group_rows, Cell, RowView};

/// Bin centre: a number, or an ISO-8601 timestamp for date series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BinLabel {
    Number(f64),
    Date(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub x: BinLabel,
    pub bin_width: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupHistogram {
    pub group_name: String,
    pub bins: Vec<HistogramBin>,
}

/// Numeric samples of one column plus whether any of them was a date
#[derive(Debug, Default)]
struct Samples {
    values: Vec<f64>,
    dates: bool,
}

impl Samples {
    fn push_value(&mut self, value: &Value) {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_f64().filter(|v| v.is_finite()) {
                    self.values.push(v);
                }
            }
            Value::Bool(b) => self.values.push(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                if let Some(millis) = parse_date_millis(s) {
                    self.dates = true;
                    self.values.push(millis);
                } else if let Some(v) = lenient_number(s) {
                    self.values.push(v);
                }
            }
            _ => {}
        }
    }

    fn push_cell(&mut self, cell: &Cell) {
        match cell {
            Cell::Absent => {}
            Cell::Value(v) => self.push_value(v),
            Cell::List(values) => values.iter().for_each(|v| self.push_value(v)),
        }
    }
}

/// Histogram of `column` over `rows`.
///
/// Returns no bins when nothing numeric was found or `bins` is zero. A
/// series whose values are all equal lands entirely in the first bin.
pub fn histogram<'r, I>(
    rows: I,
    column: &ExpandedColumn,
    grouping: FeedbackGrouping,
    bins: usize,
) -> Vec<HistogramBin>
where
    I: IntoIterator<Item = &'r Row>,
{
    let mut samples = Samples::default();
    for row in rows {
        samples.push_cell(&RowView::new(row).project(column, grouping));
    }
    bin_samples(&samples, bins)
}

/// One histogram per row group
pub fn grouped_histograms(
    rows: &[Row],
    column: &ExpandedColumn,
    group_by: &[String],
    columns: &[ExpandedColumn],
    grouping: FeedbackGrouping,
    bins: usize,
) -> Vec<GroupHistogram> {
    group_rows(rows, group_by, columns, grouping)
        .into_iter()
        .map(|group| GroupHistogram {
            bins: histogram(group.rows.iter().copied(), column, grouping, bins),
            group_name: group.name,
        })
        .collect()
}

fn bin_samples(samples: &Samples, bins: usize) -> Vec<HistogramBin> {
    if samples.values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = samples.values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples
        .values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let bin_width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for value in &samples.values {
        let index = if bin_width > 0.0 {
            (((value - min) / bin_width).floor() as usize).min(bins - 1)
        } else {
            0
        };
        counts[index] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let centre = min + i as f64 * bin_width + bin_width / 2.0;
            let x = if samples.dates {
                millis_to_iso(centre)
                    .map(BinLabel::Date)
                    .unwrap_or(BinLabel::Number(centre))
            } else {
                BinLabel::Number(centre)
            };
            HistogramBin {
                x,
                bin_width,
                count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnKind;
    use serde_json::json;

    fn rows_with_scores(scores: &[Value]) -> Vec<Row> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                serde_json::from_value(json!({
                    "id": format!("r{}", i),
                    "output_data": {"score": score}
                }))
                .unwrap()
            })
            .collect()
    }

    fn score_column() -> ExpandedColumn {
        ExpandedColumn::regular("output_data.score", "score", ColumnKind::Output)
    }

    #[test]
    fn test_empty_and_zero_bins() {
        let rows = rows_with_scores(&[json!("n/a"), json!(null)]);
        assert!(histogram(&rows, &score_column(), FeedbackGrouping::None, 10).is_empty());

        let rows = rows_with_scores(&[json!(1), json!(2)]);
        assert!(histogram(&rows, &score_column(), FeedbackGrouping::None, 0).is_empty());
    }

    #[test]
    fn test_bins_cover_range() {
        let rows = rows_with_scores(&[json!(0), json!(5), json!("10"), json!(true)]);
        let bins = histogram(&rows, &score_column(), FeedbackGrouping::None, 2);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].bin_width, 5.0);
        assert_eq!(bins[0].x, BinLabel::Number(2.5));
        assert_eq!(bins[1].x, BinLabel::Number(7.5));
        // 0 and 1 in the first bin, 5 and the max in the last
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 2);
    }

    #[test]
    fn test_constant_series_uses_first_bin() {
        let rows = rows_with_scores(&[json!(3), json!(3), json!(3)]);
        let bins = histogram(&rows, &score_column(), FeedbackGrouping::None, 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].count, 3);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 3);
    }

    #[test]
    fn test_date_series_labels_are_iso() {
        let rows = rows_with_scores(&[json!("2024-03-05T00:00:00Z"), json!("2024-03-07T00:00:00Z")]);
        let bins = histogram(&rows, &score_column(), FeedbackGrouping::None, 2);
        assert_eq!(bins[0].x, BinLabel::Date("2024-03-05T12:00:00.000Z".to_string()));
        assert_eq!(bins[1].x, BinLabel::Date("2024-03-06T12:00:00.000Z".to_string()));
    }

    #[test]
    fn test_feedback_lists_count_each_value() {
        let row: Row = serde_json::from_value(json!({
            "id": "r1",
            "feedbacks": [
                {"id": "a", "timestamp": "t", "user_id": "u", "feedback_type": "t", "feedback": {"ok": 1}},
                {"id": "b", "timestamp": "t", "user_id": "u", "feedback_type": "t", "feedback": {"ok": 0}}
            ]
        }))
        .unwrap();
        let column = ExpandedColumn::feedback("ok", "u", "t");
        let bins = histogram([&row], &column, FeedbackGrouping::None, 1);
        assert_eq!(bins[0].count, 2);
    }
}
