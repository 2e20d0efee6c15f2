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

//! Command handlers. Each returns the JSON document the CLI prints.

use anyhow::{anyhow, Context, Result};
use evalview_core::{
    column_for, compare_experiments, discover, filter_rows, group_catalog, group_rows,
    grouped_histograms, project_row, reconcile, search_catalog, sort_rows, ColumnFilter,
    ColumnSchema, EvalViewConfig, ExpandedColumn, FeedbackGrouping, FeedbackTemplate,
    FilterOperator, Row, SchemaStore, SortOrder,
};
use evalview_feedback::{build_submission, HttpFeedbackSubmitter, QueueConfig, SubmissionQueue};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// Read a JSON array of rows
pub fn load_rows(path: &Path) -> Result<Vec<Row>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rows file {:?}", path))?;
    let rows: Vec<Row> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse rows file {:?}", path))?;
    debug!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

pub fn columns(
    rows: &[Row],
    config: &EvalViewConfig,
    search: Option<&str>,
    grouped: bool,
) -> Result<Value> {
    let discovered = discover(rows, config.discovery.depths());

    if search.is_none() && !grouped {
        return Ok(serde_json::to_value(&discovered)?);
    }

    let mut groups = group_catalog(&discovered);
    if let Some(term) = search {
        groups = search_catalog(&groups, term);
    }

    if grouped {
        Ok(serde_json::to_value(&groups)?)
    } else {
        let flat: Vec<&ExpandedColumn> = groups.iter().flat_map(|g| g.columns.iter()).collect();
        Ok(serde_json::to_value(flat)?)
    }
}

/// Options of the `project` command
#[derive(Debug, Clone, Default)]
pub struct ProjectRequest {
    pub columns: Vec<String>,
    pub experiment: Option<String>,
    pub grouping: FeedbackGrouping,
    pub filters: Vec<String>,
    pub sort: Option<String>,
    pub descending: bool,
}

pub fn project(rows: &[Row], config: &EvalViewConfig, request: &ProjectRequest) -> Result<Value> {
    let discovered = discover(rows, config.discovery.depths());
    let requested: Vec<ExpandedColumn> = request
        .columns
        .iter()
        .map(|path| column_for(path, &discovered))
        .collect();

    let selection = match &request.experiment {
        Some(experiment) => {
            let store = SchemaStore::new(&config.storage.data_dir);
            reconcile(&store.get_or_default(experiment), &discovered, &requested)
        }
        None if requested.is_empty() => discovered.clone(),
        None => requested,
    };

    let filters = request
        .filters
        .iter()
        .map(|raw| parse_filter(raw, &discovered))
        .collect::<Result<Vec<_>>>()?;

    let mut visible = filter_rows(rows, &filters, request.grouping);
    if let Some(path) = &request.sort {
        let order = if request.descending {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        };
        visible = sort_rows(visible, &column_for(path, &discovered), request.grouping, order);
    }

    info!(
        rows = rows.len(),
        visible = visible.len(),
        columns = selection.len(),
        "Projected rows"
    );

    let projections: Vec<Value> = visible
        .into_iter()
        .map(|row| {
            let projection = project_row(row, &selection, request.grouping);
            json!({ "id": projection.row_id, "cells": projection.to_json() })
        })
        .collect();

    Ok(json!({
        "columns": selection,
        "rows": projections,
    }))
}

/// Parse `"PATH OPERATOR VALUE"`. The value may contain spaces.
pub fn parse_filter(raw: &str, columns: &[ExpandedColumn]) -> Result<ColumnFilter> {
    let mut parts = raw.trim().splitn(3, char::is_whitespace);
    let path = parts.next().filter(|p| !p.is_empty());
    let operator = parts.next().filter(|p| !p.is_empty());
    let value = parts.next().map(str::trim).unwrap_or_default();

    match (path, operator) {
        (Some(path), Some(operator)) => {
            let operator: FilterOperator = operator.parse().map_err(|e: String| anyhow!(e))?;
            Ok(ColumnFilter::new(column_for(path, columns), operator, value))
        }
        _ => Err(anyhow!(
            "Invalid filter {:?}, expected \"PATH OPERATOR VALUE\"",
            raw
        )),
    }
}

pub fn histogram(
    rows: &[Row],
    config: &EvalViewConfig,
    column: &str,
    bins: usize,
    grouping: FeedbackGrouping,
    group_by: &[String],
) -> Result<Value> {
    let discovered = discover(rows, config.discovery.depths());
    let column = column_for(column, &discovered);
    let histograms = grouped_histograms(rows, &column, group_by, &discovered, grouping, bins);
    Ok(serde_json::to_value(histograms)?)
}

pub fn groups(
    rows: &[Row],
    config: &EvalViewConfig,
    group_by: &[String],
    grouping: FeedbackGrouping,
) -> Result<Value> {
    let discovered = discover(rows, config.discovery.depths());
    let groups: Vec<Value> = group_rows(rows, group_by, &discovered, grouping)
        .into_iter()
        .map(|group| {
            let ids: Vec<&str> = group.rows.iter().map(|r| r.id.as_str()).collect();
            json!({ "name": group.name, "count": ids.len(), "rowIds": ids })
        })
        .collect();
    Ok(Value::Array(groups))
}

pub fn summary(rows_x: &[Row], rows_y: &[Row], group: &str) -> Result<Value> {
    Ok(serde_json::to_value(compare_experiments(rows_x, rows_y, group))?)
}

pub fn schema_get(store: &SchemaStore, experiment: &str) -> Result<Value> {
    Ok(json!({
        "experiment_id": experiment,
        "stored": store.get(experiment).is_some(),
        "columns": store.get_or_default(experiment).columns,
    }))
}

pub fn schema_set(store: &mut SchemaStore, experiment: &str, columns: Vec<String>) -> Result<Value> {
    store
        .put(experiment, ColumnSchema::new(columns))
        .with_context(|| format!("Failed to store schema for {}", experiment))?;
    schema_get(store, experiment)
}

pub fn schema_reset(store: &mut SchemaStore, experiment: &str) -> Result<Value> {
    let schema = store
        .reset(experiment)
        .with_context(|| format!("Failed to reset schema for {}", experiment))?;
    Ok(json!({ "experiment_id": experiment, "stored": true, "columns": schema.columns }))
}

pub fn schema_list(store: &SchemaStore) -> Result<Value> {
    Ok(serde_json::to_value(store.list())?)
}

/// One entry of a submissions file: either a ready `payload` or template
/// answers keyed by field label
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRecord {
    pub row_id: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub inputs: Option<Map<String, Value>>,
}

pub fn load_submissions(path: &Path) -> Result<Vec<SubmissionRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submissions file {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse submissions file {:?}", path))
}

pub fn load_template(path: &Path) -> Result<FeedbackTemplate> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse template file {:?}", path))
}

/// Resolve every record to a `(row_id, payload)` pair before anything is
/// sent, so one bad record rejects the whole batch
pub fn prepare_submissions(
    records: Vec<SubmissionRecord>,
    template: Option<&FeedbackTemplate>,
    require_all: bool,
) -> Result<Vec<(String, Value)>> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let payload = match (record.inputs, record.payload, template) {
                (Some(inputs), _, Some(template)) => {
                    build_submission(template, &inputs, require_all).with_context(|| {
                        format!("Invalid feedback for row {:?} (entry {})", record.row_id, i)
                    })?
                }
                (Some(_), _, None) => {
                    return Err(anyhow!(
                        "Entry {} has template inputs but no --template was given",
                        i
                    ))
                }
                (None, Some(payload), _) => payload,
                (None, None, _) => {
                    return Err(anyhow!("Entry {} has neither payload nor inputs", i))
                }
            };
            Ok((record.row_id, payload))
        })
        .collect()
}

/// Push every submission through the queue and wait for it to drain
pub async fn submit(submissions: Vec<(String, Value)>, config: &EvalViewConfig) -> Result<Value> {
    let submitter = HttpFeedbackSubmitter::from_config(&config.feedback)
        .context("Failed to build HTTP client")?;
    let (queue, mut outcomes) =
        SubmissionQueue::spawn_with_outcomes(submitter, QueueConfig::from(&config.feedback));

    info!(
        "Submitting {} feedback entries to {}",
        submissions.len(),
        config.feedback.api_base_url
    );
    for (row_id, payload) in submissions {
        queue.enqueue_wait(row_id, payload).await?;
    }

    let stats = queue.shutdown().await;
    let mut results = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        results.push(outcome);
    }

    Ok(json!({ "outcomes": results, "stats": stats }))
}
