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

//! Feedback aggregation
//!
//! A row can carry many feedback entries for the same field: several
//! users, several feedback types, resubmissions over time. The active
//! [`FeedbackGrouping`] decides which entries count and how they collapse
//! into the value shown in a feedback column.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::{coerce_number, parse_date};
use crate::model::{Feedback, FeedbackGrouping, Row};

/// Result of aggregating a row's feedback for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatedFeedback {
    /// Every matching value, in submission order
    All(Vec<Value>),
    /// The most recent matching value
    Latest(Value),
    /// Mean of the numeric matching values
    Mean(f64),
}

fn matches(
    feedback: &Feedback,
    field_key: &str,
    user_id: &str,
    feedback_type: &str,
    grouping: FeedbackGrouping,
) -> bool {
    if feedback.value(field_key).is_none() {
        return false;
    }

    let same_user = feedback.user() == user_id;
    let same_type = feedback.kind() == feedback_type;

    match grouping {
        FeedbackGrouping::None | FeedbackGrouping::AverageByTypeByUser => same_user && same_type,
        FeedbackGrouping::AverageByType => same_type,
        FeedbackGrouping::AverageByUser | FeedbackGrouping::LatestByUser => same_user,
    }
}

/// Aggregate the feedback of `row` for one (field, user, type) column.
///
/// Returns `None` when nothing matches, or when an averaging grouping
/// finds no value that coerces to a number.
pub fn aggregate(
    row: &Row,
    field_key: &str,
    user_id: &str,
    feedback_type: &str,
    grouping: FeedbackGrouping,
) -> Option<AggregatedFeedback> {
    let matching: Vec<&Feedback> = row
        .feedbacks
        .iter()
        .filter(|fb| matches(fb, field_key, user_id, feedback_type, grouping))
        .collect();

    if matching.is_empty() {
        return None;
    }

    match grouping {
        FeedbackGrouping::None => Some(AggregatedFeedback::All(
            matching
                .iter()
                .filter_map(|fb| fb.value(field_key).cloned())
                .collect(),
        )),
        FeedbackGrouping::LatestByUser => latest(&matching)
            .and_then(|fb| fb.value(field_key).cloned())
            .map(AggregatedFeedback::Latest),
        FeedbackGrouping::AverageByUser
        | FeedbackGrouping::AverageByType
        | FeedbackGrouping::AverageByTypeByUser => {
            let numbers: Vec<f64> = matching
                .iter()
                .filter_map(|fb| fb.value(field_key).and_then(coerce_number))
                .collect();
            mean(&numbers).map(AggregatedFeedback::Mean)
        }
    }
}

/// Newest entry by timestamp. Equal (or unparseable) timestamps keep
/// submission order, so the earliest-listed of the newest entries wins.
fn latest<'a>(entries: &[&'a Feedback]) -> Option<&'a Feedback> {
    let mut ordered: Vec<(Option<i64>, &'a Feedback)> = entries
        .iter()
        .map(|fb| {
            (
                parse_date(&fb.timestamp).map(|dt| dt.timestamp_micros()),
                *fb,
            )
        })
        .collect();
    // Stable sort, newest first; unparseable timestamps sort last
    ordered.sort_by(|a, b| b.0.cmp(&a.0));
    ordered.first().map(|(_, fb)| *fb)
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    avg.is_finite().then_some(avg)
}
