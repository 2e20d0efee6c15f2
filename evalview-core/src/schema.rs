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

//! Per-experiment column schemas
//!
//! A schema is the list of regular column paths a user picked for an
//! experiment. Feedback columns are never persisted; they are carried over
//! from the current selection when the schema is re-applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::discover::{is_base_row_path, persistent_columns};
use crate::error::{EvalViewError, Result};
use crate::model::{ColumnKind, ExpandedColumn};

pub const SCHEMA_FILE: &str = "column_schemas.json";

/// Selected regular column paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub columns: Vec<String>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Schema holding only the persistent columns
    pub fn persistent() -> Self {
        Self::new(schema_paths(&persistent_columns()))
    }
}

/// Label for a schema path missing from the catalog:
/// `output_data.score` -> `Output_data > Score`
pub fn fallback_label(path: &str) -> String {
    path.split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" > ")
}

/// Rebuild the column selection for an experiment.
///
/// Order: persistent columns, then the schema's columns (catalog entry or
/// a generated label), then base row columns and feedback columns that
/// were already selected. The first occurrence of a path wins.
pub fn reconcile(
    schema: &ColumnSchema,
    available: &[ExpandedColumn],
    current: &[ExpandedColumn],
) -> Vec<ExpandedColumn> {
    let schema_columns = schema.columns.iter().map(|path| {
        available
            .iter()
            .find(|c| c.path() == path)
            .cloned()
            .unwrap_or_else(|| ExpandedColumn::regular(path, fallback_label(path), ColumnKind::Info))
    });
    let selected_base = current
        .iter()
        .filter(|c| !c.is_feedback() && is_base_row_path(c.path()))
        .cloned();
    let selected_feedback = current.iter().filter(|c| c.is_feedback()).cloned();

    let mut seen = HashSet::new();
    persistent_columns()
        .into_iter()
        .chain(schema_columns)
        .chain(selected_base)
        .chain(selected_feedback)
        .filter(|c| seen.insert(c.path().to_string()))
        .collect()
}

/// Paths worth persisting: every non-feedback column
pub fn schema_paths(columns: &[ExpandedColumn]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !c.is_feedback())
        .map(|c| c.path().to_string())
        .collect()
}

/// Add or remove one column. Returns the new selection and, when the
/// toggled column is a regular one, the schema to persist.
pub fn toggle_column(
    selection: &[ExpandedColumn],
    column: &ExpandedColumn,
    checked: bool,
) -> (Vec<ExpandedColumn>, Option<ColumnSchema>) {
    let mut next: Vec<ExpandedColumn> = selection
        .iter()
        .filter(|c| c.path() != column.path())
        .cloned()
        .collect();
    if checked {
        next.push(column.clone());
    }

    let schema = (!column.is_feedback()).then(|| ColumnSchema::new(schema_paths(&next)));
    (next, schema)
}

/// Select or clear every feedback column of the catalog at once
pub fn toggle_all_feedback(
    selection: &[ExpandedColumn],
    available: &[ExpandedColumn],
    checked: bool,
) -> Vec<ExpandedColumn> {
    let mut next: Vec<ExpandedColumn> = selection.iter().filter(|c| !c.is_feedback()).cloned().collect();
    if checked {
        next.extend(available.iter().filter(|c| c.is_feedback()).cloned());
    }
    next
}

/// One stored schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub experiment_id: String,
    #[serde(flatten)]
    pub schema: ColumnSchema,
    pub updated_at: DateTime<Utc>,
}

/// File-backed schema registry keyed by experiment id
pub struct SchemaStore {
    entries: HashMap<String, SchemaEntry>,
    file_path: PathBuf,
}

impl SchemaStore {
    pub fn new(data_dir: &Path) -> Self {
        let mut store = Self {
            entries: HashMap::new(),
            file_path: data_dir.join(SCHEMA_FILE),
        };

        if let Err(e) = store.load() {
            warn!("Failed to load column schemas from {:?}: {}", store.file_path, e);
        }

        store
    }

    fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.file_path)?;
        let entries: Vec<SchemaEntry> = serde_json::from_str(&contents)?;

        for entry in entries {
            self.entries.insert(entry.experiment_id.clone(), entry);
        }

        info!("Loaded {} column schemas", self.entries.len());
        Ok(())
    }

    /// Write `entries` to disk; callers swap them in only after this succeeds
    fn save(&self, entries: &HashMap<String, SchemaEntry>) -> Result<()> {
        let mut entries: Vec<&SchemaEntry> = entries.values().collect();
        entries.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        let json = serde_json::to_string_pretty(&entries)?;

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Keep the previous version around
        if self.file_path.exists() {
            let backup_path = self.file_path.with_extension("json.bak");
            std::fs::copy(&self.file_path, backup_path)?;
        }

        std::fs::write(&self.file_path, json)?;
        Ok(())
    }

    pub fn get(&self, experiment_id: &str) -> Option<&ColumnSchema> {
        self.entries.get(experiment_id).map(|e| &e.schema)
    }

    /// Stored schema, or the persistent columns when none was saved
    pub fn get_or_default(&self, experiment_id: &str) -> ColumnSchema {
        self.get(experiment_id)
            .cloned()
            .unwrap_or_else(ColumnSchema::persistent)
    }

    pub fn put(&mut self, experiment_id: &str, schema: ColumnSchema) -> Result<()> {
        if experiment_id.trim().is_empty() {
            return Err(EvalViewError::InvalidSchema(
                "experiment id must not be empty".to_string(),
            ));
        }

        let mut entries = self.entries.clone();
        entries.insert(
            experiment_id.to_string(),
            SchemaEntry {
                experiment_id: experiment_id.to_string(),
                schema,
                updated_at: Utc::now(),
            },
        );
        self.save(&entries)?;
        self.entries = entries;
        Ok(())
    }

    /// Reset to the persistent columns only
    pub fn reset(&mut self, experiment_id: &str) -> Result<ColumnSchema> {
        let schema = ColumnSchema::persistent();
        self.put(experiment_id, schema.clone())?;
        Ok(schema)
    }

    pub fn remove(&mut self, experiment_id: &str) -> Result<()> {
        let mut entries = self.entries.clone();
        if entries.remove(experiment_id).is_none() {
            return Err(EvalViewError::SchemaNotFound(experiment_id.to_string()));
        }
        self.save(&entries)?;
        self.entries = entries;
        Ok(())
    }

    /// All stored schemas ordered by experiment id
    pub fn list(&self) -> Vec<&SchemaEntry> {
        let mut entries: Vec<&SchemaEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        entries
    }
}
