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

//! Side-by-side feedback averages for two experiments

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::aggregate::mean;
use crate::model::Row;
use crate::path::resolve_display;

/// Group key used when the grouping path resolves to nothing
pub const NOT_AVAILABLE: &str = "N/A";

/// Averages per feedback field for one experiment within a group
pub type FieldAverages = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryGroup {
    pub grouping_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_x: Option<FieldAverages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_y: Option<FieldAverages>,
}

fn numeric_feedback(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Feedback fields with at least one number or boolean value, first-seen order
pub fn numeric_feedback_fields<'r, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'r Row>,
{
    let mut fields: Vec<String> = Vec::new();
    for feedback in rows.into_iter().flat_map(|row| row.feedbacks.iter()) {
        for (key, value) in &feedback.feedback {
            if numeric_feedback(value).is_some() && !fields.iter().any(|f| f == key) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

#[derive(Default)]
struct Collected {
    x: Option<HashMap<String, Vec<f64>>>,
    y: Option<HashMap<String, Vec<f64>>>,
}

#[derive(Clone, Copy)]
enum Side {
    X,
    Y,
}

impl Collected {
    fn side(&mut self, side: Side) -> &mut HashMap<String, Vec<f64>> {
        match side {
            Side::X => self.x.get_or_insert_with(HashMap::new),
            Side::Y => self.y.get_or_insert_with(HashMap::new),
        }
    }
}

fn collect_rows(
    rows: &[Row],
    grouping_path: &str,
    fields: &[String],
    groups: &mut Vec<(String, Collected)>,
    side: Side,
) {
    for row in rows {
        let mut key = resolve_display(&row.to_value(), grouping_path);
        if key.is_empty() {
            key = NOT_AVAILABLE.to_string();
        }

        let index = match groups.iter().position(|(k, _)| *k == key) {
            Some(i) => i,
            None => {
                groups.push((key, Collected::default()));
                groups.len() - 1
            }
        };
        let values = groups[index].1.side(side);

        for field in fields {
            for feedback in &row.feedbacks {
                if let Some(v) = feedback.value(field).and_then(numeric_feedback) {
                    values.entry(field.clone()).or_default().push(v);
                }
            }
        }
    }
}

fn averages(collected: Option<HashMap<String, Vec<f64>>>) -> Option<FieldAverages> {
    collected.map(|fields| {
        fields
            .into_iter()
            .filter_map(|(field, values)| mean(&values).map(|avg| (field, avg)))
            .collect()
    })
}

/// Group both experiments' rows by the displayed value at `grouping_path`
/// and average every numeric feedback field per experiment and group.
pub fn compare_experiments(rows_x: &[Row], rows_y: &[Row], grouping_path: &str) -> Vec<SummaryGroup> {
    let fields = numeric_feedback_fields(rows_x.iter().chain(rows_y.iter()));
    let mut groups: Vec<(String, Collected)> = Vec::new();

    collect_rows(rows_x, grouping_path, &fields, &mut groups, Side::X);
    collect_rows(rows_y, grouping_path, &fields, &mut groups, Side::Y);

    groups
        .into_iter()
        .map(|(grouping_key, collected)| SummaryGroup {
            grouping_key,
            experiment_x: averages(collected.x),
            experiment_y: averages(collected.y),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_fields() {
        let rows = rows(json!([
            {"id": "r1", "feedbacks": [
                {"id": "f1", "timestamp": "t", "feedback": {"notes": "ok", "correct": true}},
                {"id": "f2", "timestamp": "t", "feedback": {"score": 3, "notes": 1}}
            ]}
        ]));
        assert_eq!(numeric_feedback_fields(&rows), vec!["correct", "score", "notes"]);
    }

    #[test]
    fn test_compare_experiments() {
        let x = rows(json!([
            {"id": "x1", "input_data": {"topic": "math"}, "feedbacks": [
                {"id": "f1", "timestamp": "t", "feedback": {"score": 4, "correct": true}},
                {"id": "f2", "timestamp": "t", "feedback": {"score": 2, "correct": false}}
            ]},
            {"id": "x2", "input_data": {}, "feedbacks": [
                {"id": "f3", "timestamp": "t", "feedback": {"score": 5}}
            ]}
        ]));
        let y = rows(json!([
            {"id": "y1", "input_data": {"topic": "math"}, "feedbacks": [
                {"id": "f4", "timestamp": "t", "feedback": {"score": 1, "score_text": "bad"}}
            ]}
        ]));

        let summary = compare_experiments(&x, &y, "input_data.topic");
        assert_eq!(summary.len(), 2);

        let math = &summary[0];
        assert_eq!(math.grouping_key, "math");
        let mx = math.experiment_x.as_ref().unwrap();
        assert_eq!(mx["score"], 3.0);
        assert_eq!(mx["correct"], 0.5);
        assert_eq!(math.experiment_y.as_ref().unwrap()["score"], 1.0);

        let na = &summary[1];
        assert_eq!(na.grouping_key, NOT_AVAILABLE);
        assert_eq!(na.experiment_x.as_ref().unwrap()["score"], 5.0);
        assert!(na.experiment_y.is_none());
    }
}
