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

//! Column picker catalog: discovered columns grouped for display and
//! filtered by a search term.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::ExpandedColumn;

pub const FEEDBACK_GROUP: &str = "Feedback Fields";
pub const SELECTED_GROUP: &str = "Selected";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogGroup {
    pub name: String,
    pub columns: Vec<ExpandedColumn>,
}

/// Group a column is listed under: feedback columns share one group,
/// others use the second-to-last label part (or the only part).
pub fn group_name(column: &ExpandedColumn) -> &str {
    if column.is_feedback() {
        return FEEDBACK_GROUP;
    }
    let parts: Vec<&str> = column.label().split(" > ").collect();
    if parts.len() > 1 {
        parts[parts.len() - 2]
    } else {
        parts[0]
    }
}

/// Group columns, keeping first-seen order for groups and their members
pub fn group_catalog(columns: &[ExpandedColumn]) -> Vec<CatalogGroup> {
    let mut groups: Vec<CatalogGroup> = Vec::new();
    for column in columns {
        let name = group_name(column);
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.columns.push(column.clone()),
            None => groups.push(CatalogGroup {
                name: name.to_string(),
                columns: vec![column.clone()],
            }),
        }
    }
    groups
}

/// Case-insensitive search. A matching group name keeps the whole group;
/// otherwise only members whose last label part matches survive.
pub fn search_catalog(groups: &[CatalogGroup], term: &str) -> Vec<CatalogGroup> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return groups.to_vec();
    }

    groups
        .iter()
        .filter_map(|group| {
            if group.name.to_lowercase().contains(&term) {
                return Some(group.clone());
            }
            let columns: Vec<ExpandedColumn> = group
                .columns
                .iter()
                .filter(|c| c.short_label().to_lowercase().contains(&term))
                .cloned()
                .collect();
            (!columns.is_empty()).then(|| CatalogGroup {
                name: group.name.clone(),
                columns,
            })
        })
        .collect()
}

/// Prepend a "Selected" group listing the selected columns found in the
/// catalog. Selected columns stay in their own groups as well.
pub fn selected_first(groups: &[CatalogGroup], selection: &[ExpandedColumn]) -> Vec<CatalogGroup> {
    let selected_paths: HashSet<&str> = selection.iter().map(|c| c.path()).collect();
    let selected: Vec<ExpandedColumn> = groups
        .iter()
        .flat_map(|g| g.columns.iter())
        .filter(|c| selected_paths.contains(c.path()))
        .cloned()
        .collect();

    let mut result = Vec::with_capacity(groups.len() + 1);
    if !selected.is_empty() {
        result.push(CatalogGroup {
            name: SELECTED_GROUP.to_string(),
            columns: selected,
        });
    }
    result.extend(groups.iter().cloned());
    result
}
