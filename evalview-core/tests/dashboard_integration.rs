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

//! End-to-end flow: discover columns, restore a schema, project, group,
//! bin and summarize a batch of experiment rows.

use evalview_core::{
    compare_experiments, discover, filter_rows, group_catalog, group_rows, histogram,
    project_rows, reconcile, search_catalog, toggle_column, Cell, ColumnFilter, ColumnSchema,
    DiscoveryDepths, ExpandedColumn, FeedbackGrouping, FilterOperator, Row, SchemaStore,
};
use serde_json::json;
use tempfile::TempDir;

fn experiment_rows() -> Vec<Row> {
    serde_json::from_value(json!([
        {
            "id": "row-1",
            "created_at": "2024-03-01T09:00:00Z",
            "tags": ["baseline"],
            "input_data": {"question": "2+2?"},
            "spans": [{
                "id": "s1",
                "name": "pipeline",
                "duration": 1.5,
                "meta_info": {"model": "small"},
                "children": [{
                    "id": "s2",
                    "name": "llm",
                    "duration": 1.2,
                    "output_data": {"answer": "4", "usage": {"tokens": 12}}
                }]
            }],
            "feedback_count": 2,
            "feedbacks": [
                {"id": "f1", "timestamp": "2024-03-02T10:00:00Z", "user_id": "alice",
                 "feedback_type": "review", "feedback": {"correct": true, "score": 4}},
                {"id": "f2", "timestamp": "2024-03-03T10:00:00Z", "user_id": "alice",
                 "feedback_type": "review", "feedback": {"correct": false, "score": 2}}
            ]
        },
        {
            "id": "row-2",
            "created_at": "2024-03-01T10:00:00Z",
            "input_data": {"question": "capital of France?"},
            "spans": [{
                "id": "s3",
                "name": "pipeline",
                "duration": 2.5,
                "meta_info": {"model": "large"},
                "error": "rate limited"
            }],
            "feedbacks": [
                {"id": "f3", "timestamp": "2024-03-02T11:00:00Z", "user_id": "bob",
                 "feedback_type": "review", "feedback": {"score": 5}}
            ]
        }
    ]))
    .unwrap()
}

#[test]
fn test_discover_then_project() {
    let rows = experiment_rows();
    let columns = discover(&rows, DiscoveryDepths::default());

    let find = |path: &str| -> ExpandedColumn {
        columns
            .iter()
            .find(|c| c.path() == path)
            .cloned()
            .unwrap_or_else(|| panic!("missing column {}", path))
    };

    let answer = find("spans[0].children[0].output_data.answer");
    assert_eq!(answer.label(), "pipeline > llm Output > answer");
    let tokens = find("spans[0].children[0].output_data.usage.tokens");
    let error = find("spans[0].error");
    let score = find("feedbacks.review.alice.score");

    let selection = vec![answer, tokens, error, score];
    let projections = project_rows(&rows, &selection, FeedbackGrouping::AverageByUser);

    assert_eq!(projections[0].get("spans[0].children[0].output_data.answer"), Some(&Cell::Value(json!("4"))));
    assert_eq!(projections[0].get("spans[0].children[0].output_data.usage.tokens"), Some(&Cell::Value(json!(12))));
    assert_eq!(projections[0].get("feedbacks.review.alice.score"), Some(&Cell::Value(json!(3.0))));
    assert_eq!(projections[1].get("spans[0].error"), Some(&Cell::Value(json!("rate limited"))));
    assert_eq!(projections[1].get("feedbacks.review.alice.score"), Some(&Cell::Absent));
}

#[test]
fn test_catalog_search_finds_feedback_and_span_fields() {
    let rows = experiment_rows();
    let groups = group_catalog(&discover(&rows, DiscoveryDepths::default()));

    let feedback = search_catalog(&groups, "feedback");
    assert_eq!(feedback.len(), 2);
    assert_eq!(feedback[0].name, "row");
    assert_eq!(feedback[1].name, "Feedback Fields");
    assert_eq!(feedback[1].columns.len(), 3);

    let model = search_catalog(&groups, "model");
    assert_eq!(model.len(), 1);
    assert_eq!(model[0].name, "pipeline Meta");
}

#[test]
fn test_schema_survives_restart() {
    let rows = experiment_rows();
    let available = discover(&rows, DiscoveryDepths::default());
    let temp_dir = TempDir::new().unwrap();

    let duration = available
        .iter()
        .find(|c| c.path() == "spans[0].duration")
        .cloned()
        .unwrap();
    let score = available
        .iter()
        .find(|c| c.is_feedback())
        .cloned()
        .unwrap();

    let initial = reconcile(&ColumnSchema::persistent(), &available, &[]);
    let (selection, schema) = toggle_column(&initial, &duration, true);
    let (selection, no_schema) = toggle_column(&selection, &score, true);
    assert!(no_schema.is_none());

    let mut store = SchemaStore::new(temp_dir.path());
    store.put("exp-1", schema.unwrap()).unwrap();

    let reopened = SchemaStore::new(temp_dir.path());
    let restored = reconcile(&reopened.get_or_default("exp-1"), &available, &selection);
    let paths: Vec<_> = restored.iter().map(|c| c.path()).collect();
    assert_eq!(paths, vec!["created_at", "spans[0].duration", score.path()]);
}

#[test]
fn test_grouping_and_filters() {
    let rows = experiment_rows();
    let columns = discover(&rows, DiscoveryDepths::default());

    let groups = group_rows(
        &rows,
        &["spans[0].meta_info.model".to_string(), "_none".to_string()],
        &columns,
        FeedbackGrouping::None,
    );
    let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["small", "large"]);

    let slow = ColumnFilter::new(
        ExpandedColumn::regular("spans[0].duration", "d", Default::default()),
        FilterOperator::Gt,
        "2",
    );
    let filtered = filter_rows(&rows, &[slow], FeedbackGrouping::None);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, "row-2");
}

#[test]
fn test_histogram_of_hundred_values() {
    let rows: Vec<Row> = (0..100)
        .map(|i| {
            serde_json::from_value(json!({
                "id": format!("row-{}", i),
                "output_data": {"latency": i as f64}
            }))
            .unwrap()
        })
        .collect();
    let column = ExpandedColumn::regular("output_data.latency", "latency", Default::default());

    let bins = histogram(&rows, &column, FeedbackGrouping::None, 10);
    assert_eq!(bins.len(), 10);
    assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
    assert!(bins.iter().all(|b| (b.bin_width - 9.9).abs() < 1e-9));

    let empty: Vec<Row> = Vec::new();
    assert!(histogram(&empty, &column, FeedbackGrouping::None, 10).is_empty());
}

#[test]
fn test_compare_two_experiments() {
    let rows = experiment_rows();
    let summary = compare_experiments(&rows[..1], &rows[1..], "spans[0].name");
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].grouping_key, "pipeline");
    let x = summary[0].experiment_x.as_ref().unwrap();
    assert_eq!(x["score"], 3.0);
    assert_eq!(x["correct"], 0.5);
    assert_eq!(summary[0].experiment_y.as_ref().unwrap()["score"], 5.0);
}
