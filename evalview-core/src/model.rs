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

//! Row, span and feedback shapes as served by the experiment backend,
//! plus the column descriptors derived from them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::coerce::coerce_number;

/// Placeholder used when a feedback entry carries no user or type
pub const UNKNOWN: &str = "Unknown";

/// One evaluation example of an experiment
///
/// Every field tolerates `null` and loosely typed values. Keys the model
/// does not name are kept in `extra` so paths can still reach them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub experiment_id: Option<String>,

    /// Creation timestamp as sent by the backend (ISO-8601)
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,

    #[serde(default)]
    pub input_data: Value,

    #[serde(default)]
    pub output_data: Value,

    #[serde(default, deserialize_with = "loose_strings")]
    pub tags: Vec<String>,

    /// Root spans of the trace tree
    #[serde(default, deserialize_with = "loose_list")]
    pub spans: Vec<Span>,

    #[serde(default, deserialize_with = "lenient_count")]
    pub feedback_count: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub feedback_assigned: u64,

    #[serde(default, deserialize_with = "loose_list")]
    pub feedbacks: Vec<Feedback>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Row {
    /// JSON view of the row that paths are resolved against
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One node of a row's trace tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Span {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub span_type: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: String,

    /// Duration in seconds
    #[serde(
        default,
        deserialize_with = "loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta_info: Value,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input_data: Value,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output_data: Value,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_name: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency: Option<f64>,

    #[serde(
        default,
        deserialize_with = "loose_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_count: Option<u64>,

    #[serde(default, deserialize_with = "loose_list")]
    pub children: Vec<Span>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One annotation entry submitted by a user for a row
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback_type: Option<String>,

    /// Field label -> submitted value (bool, number or text)
    #[serde(default, deserialize_with = "loose_map")]
    pub feedback: Map<String, Value>,
}

impl Feedback {
    pub fn user(&self) -> &str {
        self.user_id.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn kind(&self) -> &str {
        self.feedback_type.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn value(&self, field_key: &str) -> Option<&Value> {
        self.feedback.get(field_key)
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Accepts strings and numbers for identifier-like fields
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(other) => Some(value_text(other)),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_string(deserializer)?.unwrap_or_default())
}

/// Numbers and numeric strings; booleans and anything else are absent
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ (Value::Number(_) | Value::String(_))) => coerce_number(&value),
        _ => None,
    })
}

fn loose_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_number(deserializer)?
        .filter(|n| *n >= 0.0)
        .map(|n| n.trunc() as u64))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_count(deserializer)?.unwrap_or_default())
}

/// A list of strings; a lone string becomes a one-element list
fn loose_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(value_text)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// A list of records. Entries that do not parse are dropped; anything
/// but an array is an empty list.
fn loose_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("Dropping malformed entry: {}", e);
                None
            }
        })
        .collect())
}

fn loose_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    })
}

/// Display category of a regular column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Info,
    Duration,
    Error,
    Input,
    Output,
}

/// Column backed by a path into the row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegularColumn {
    pub path: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: ColumnKind,
}

/// Column backed by the feedback aggregator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackColumn {
    /// Opaque identity key, never resolved as a path
    pub path: String,
    pub label: String,
    pub field_key: String,
    pub user_id: String,
    pub feedback_type: String,
}

/// A user-selectable column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpandedColumn {
    Feedback(FeedbackColumn),
    Regular(RegularColumn),
}

impl ExpandedColumn {
    pub fn regular(path: impl Into<String>, label: impl Into<String>, kind: ColumnKind) -> Self {
        ExpandedColumn::Regular(RegularColumn {
            path: path.into(),
            label: label.into(),
            kind,
        })
    }

    pub fn feedback(
        field_key: impl Into<String>,
        user_id: impl Into<String>,
        feedback_type: impl Into<String>,
    ) -> Self {
        let field_key = field_key.into();
        let user_id = user_id.into();
        let feedback_type = feedback_type.into();
        ExpandedColumn::Feedback(FeedbackColumn {
            path: format!("feedbacks.{}.{}.{}", feedback_type, user_id, field_key),
            label: field_key.clone(),
            field_key,
            user_id,
            feedback_type,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            ExpandedColumn::Regular(c) => &c.path,
            ExpandedColumn::Feedback(c) => &c.path,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ExpandedColumn::Regular(c) => &c.label,
            ExpandedColumn::Feedback(c) => &c.label,
        }
    }

    pub fn is_feedback(&self) -> bool {
        matches!(self, ExpandedColumn::Feedback(_))
    }

    /// Last `" > "` separated segment of the label
    pub fn short_label(&self) -> &str {
        self.label().rsplit(" > ").next().unwrap_or_default()
    }
}

/// Input control of a template field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Thumbs up / down, submitted as 1 or 0
    #[default]
    Binary,
    Numeric,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    #[serde(default)]
    pub value: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
}

/// Inclusive bounds of a numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default = "default_range_min")]
    pub min: f64,
    #[serde(default = "default_range_max")]
    pub max: f64,
    #[serde(default, deserialize_with = "loose_list")]
    pub rubric: Vec<RubricItem>,
}

fn default_range_min() -> f64 {
    1.0
}

fn default_range_max() -> f64 {
    10.0
}

impl Default for NumericRange {
    fn default() -> Self {
        Self {
            min: default_range_min(),
            max: default_range_max(),
            rubric: Vec::new(),
        }
    }
}

/// One question of a feedback template; `label` is the submitted key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackField {
    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_range: Option<NumericRange>,
}

impl FeedbackField {
    /// Bounds of a numeric field, 1..=10 when the template gives none
    pub fn range(&self) -> NumericRange {
        self.numeric_range.clone().unwrap_or_default()
    }
}

/// Questions asked when annotating rows of an experiment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackTemplate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub experiment_id: String,

    #[serde(default, deserialize_with = "loose_list")]
    pub fields: Vec<FeedbackField>,

    /// Columns shown next to the annotation form
    #[serde(default, deserialize_with = "loose_list")]
    pub display_columns: Vec<ExpandedColumn>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_at: String,
}

impl FeedbackTemplate {
    pub fn field(&self, label: &str) -> Option<&FeedbackField> {
        self.fields.iter().find(|f| f.label == label)
    }
}

/// Rule for collapsing several feedback entries into one display value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackGrouping {
    #[default]
    None,
    AverageByUser,
    LatestByUser,
    AverageByType,
    AverageByTypeByUser,
}

impl FeedbackGrouping {
    pub const ALL: [FeedbackGrouping; 5] = [
        FeedbackGrouping::None,
        FeedbackGrouping::AverageByUser,
        FeedbackGrouping::LatestByUser,
        FeedbackGrouping::AverageByType,
        FeedbackGrouping::AverageByTypeByUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackGrouping::None => "none",
            FeedbackGrouping::AverageByUser => "averageByUser",
            FeedbackGrouping::LatestByUser => "latestByUser",
            FeedbackGrouping::AverageByType => "averageByType",
            FeedbackGrouping::AverageByTypeByUser => "averageByTypeByUser",
        }
    }

    pub fn is_average(&self) -> bool {
        matches!(
            self,
            FeedbackGrouping::AverageByUser
                | FeedbackGrouping::AverageByType
                | FeedbackGrouping::AverageByTypeByUser
        )
    }
}

impl fmt::Display for FeedbackGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackGrouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "none" => Ok(FeedbackGrouping::None),
            "averagebyuser" => Ok(FeedbackGrouping::AverageByUser),
            "latestbyuser" => Ok(FeedbackGrouping::LatestByUser),
            "averagebytype" => Ok(FeedbackGrouping::AverageByType),
            "averagebytypebyuser" => Ok(FeedbackGrouping::AverageByTypeByUser),
            _ => Err(format!("Unknown feedback grouping: {}", s)),
        }
    }
}
