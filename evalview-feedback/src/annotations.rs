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

//! Text annotations on displayed cells
//!
//! Reviewers highlight a passage inside a column's rendered text and
//! attach a comment. The board owns every annotation and indexes them by
//! id, so removal needs nothing but the id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    /// Highlighted passage
    pub text: String,
    /// Highlight colour, e.g. `#facc15`
    pub color: String,
    pub comment: String,
}

/// One highlighted byte range of a cell's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightRange {
    pub start: usize,
    pub end: usize,
    pub annotation_id: String,
}

/// Annotations per column path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationBoard {
    columns: HashMap<String, Vec<Annotation>>,
    #[serde(skip)]
    index: HashMap<String, String>,
}

impl AnnotationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the id index, e.g. after deserializing
    pub fn reindex(&mut self) {
        self.index = self
            .columns
            .iter()
            .flat_map(|(path, list)| list.iter().map(move |a| (a.id.clone(), path.clone())))
            .collect();
    }

    /// Annotate `text` inside the column at `column_path`. Returns the new
    /// annotation id, or `None` when the passage is blank.
    pub fn add(
        &mut self,
        column_path: &str,
        text: &str,
        color: &str,
        comment: &str,
    ) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        let id = Uuid::new_v4().to_string();
        self.columns
            .entry(column_path.to_string())
            .or_default()
            .push(Annotation {
                id: id.clone(),
                text: text.to_string(),
                color: color.to_string(),
                comment: comment.to_string(),
            });
        self.index.insert(id.clone(), column_path.to_string());
        Some(id)
    }

    /// Remove an annotation by id alone
    pub fn remove(&mut self, annotation_id: &str) -> Option<Annotation> {
        let path = self.index.remove(annotation_id)?;
        let list = self.columns.get_mut(&path)?;
        let position = list.iter().position(|a| a.id == annotation_id)?;
        let removed = list.remove(position);
        if list.is_empty() {
            self.columns.remove(&path);
        }
        Some(removed)
    }

    pub fn get(&self, annotation_id: &str) -> Option<&Annotation> {
        let path = self.index.get(annotation_id)?;
        self.columns.get(path)?.iter().find(|a| a.id == annotation_id)
    }

    pub fn for_column(&self, column_path: &str) -> &[Annotation] {
        self.columns
            .get(column_path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Ranges of `content` to highlight for a column.
    ///
    /// Longer passages claim text first; every non-overlapping occurrence
    /// of a passage is highlighted. Ranges come back sorted by start.
    pub fn highlights(&self, column_path: &str, content: &str) -> Vec<HighlightRange> {
        let mut ordered: Vec<&Annotation> = self.for_column(column_path).iter().collect();
        ordered.sort_by(|a, b| b.text.len().cmp(&a.text.len()));

        let mut ranges: Vec<HighlightRange> = Vec::new();
        for annotation in ordered {
            for (start, matched) in content.match_indices(annotation.text.as_str()) {
                let end = start + matched.len();
                let overlaps = ranges.iter().any(|r| start < r.end && r.start < end);
                if !overlaps {
                    ranges.push(HighlightRange {
                        start,
                        end,
                        annotation_id: annotation.id.clone(),
                    });
                }
            }
        }

        ranges.sort_by_key(|r| r.start);
        ranges
    }
}
