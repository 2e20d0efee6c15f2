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

//! Template-driven feedback payloads
//!
//! A reviewer answers the fields of a [`FeedbackTemplate`]; the answers are
//! validated against each field's kind and turned into the body the
//! feedback endpoint expects:
//!
//! ```json
//! {"feedback": {"<label>": <value>, ...}, "feedback_type": "user_feedback"}
//! ```

use evalview_core::coerce::coerce_number;
use evalview_core::{FeedbackField, FeedbackTemplate, FieldKind};
use serde_json::{json, Map, Value};

use crate::error::{Result, SubmitError};

/// Feedback type recorded for template submissions
pub const USER_FEEDBACK_TYPE: &str = "user_feedback";

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn binary_value(field: &FeedbackField, value: &Value) -> Result<Value> {
    let positive = match value {
        Value::Bool(b) => *b,
        other => match coerce_number(other) {
            Some(n) if n == 1.0 => true,
            Some(n) if n == 0.0 => false,
            _ => {
                return Err(SubmitError::Invalid(format!(
                    "field '{}' expects 1 or 0, got {}",
                    field.label, value
                )))
            }
        },
    };
    Ok(Value::from(u8::from(positive)))
}

fn numeric_value(field: &FeedbackField, value: &Value) -> Result<Value> {
    let n = match value {
        Value::Number(_) | Value::String(_) => coerce_number(value),
        _ => None,
    }
    .ok_or_else(|| {
        SubmitError::Invalid(format!("field '{}' expects a number, got {}", field.label, value))
    })?;

    let range = field.range();
    if n < range.min || n > range.max {
        return Err(SubmitError::Invalid(format!(
            "field '{}' must be between {} and {}, got {}",
            field.label, range.min, range.max, n
        )));
    }

    if n.fract() == 0.0 {
        Ok(Value::from(n as i64))
    } else {
        Ok(Value::from(n))
    }
}

fn text_value(field: &FeedbackField, value: &Value) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(s.clone())),
        other => Err(SubmitError::Invalid(format!(
            "field '{}' expects text, got {}",
            field.label, other
        ))),
    }
}

/// Build a feedback payload from answers keyed by field label.
///
/// Blank answers are skipped unless `require_all` is set, in which case
/// every field of the template must be answered. Labels the template does
/// not define and payloads with no answer at all are rejected.
pub fn build_submission(
    template: &FeedbackTemplate,
    inputs: &Map<String, Value>,
    require_all: bool,
) -> Result<Value> {
    if let Some(unknown) = inputs.keys().find(|label| template.field(label).is_none()) {
        return Err(SubmitError::Invalid(format!(
            "template '{}' has no field '{}'",
            template.id, unknown
        )));
    }

    let mut feedback = Map::new();
    for field in &template.fields {
        let answer = inputs.get(&field.label);
        if is_blank(answer) {
            if require_all {
                return Err(SubmitError::Invalid(format!(
                    "field '{}' is required",
                    field.label
                )));
            }
            continue;
        }
        let Some(answer) = answer else { continue };

        let value = match field.kind {
            FieldKind::Binary => binary_value(field, answer)?,
            FieldKind::Numeric => numeric_value(field, answer)?,
            FieldKind::Text => text_value(field, answer)?,
        };
        feedback.insert(field.label.clone(), value);
    }

    if feedback.is_empty() {
        return Err(SubmitError::Invalid("no feedback values given".to_string()));
    }

    Ok(json!({
        "feedback": feedback,
        "feedback_type": USER_FEEDBACK_TYPE,
    }))
}
