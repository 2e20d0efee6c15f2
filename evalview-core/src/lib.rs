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

//! Evalview Core
//!
//! Turns raw experiment rows (nested traces plus user feedback) into flat,
//! column-addressable records for tables, charts and summaries.

pub mod aggregate;
pub mod catalog;
pub mod coerce;
pub mod config;
pub mod discover;
pub mod error;
pub mod histogram;
pub mod model;
pub mod path;
pub mod projection;
pub mod schema;
pub mod summary;
pub mod table;

pub use aggregate::{aggregate, AggregatedFeedback};
pub use catalog::{group_catalog, search_catalog, selected_first, CatalogGroup};
pub use config::EvalViewConfig;
pub use discover::{
    base_row_columns, discover, feedback_columns, persistent_columns, DiscoveryDepths,
    DEFAULT_DEPTH,
};
pub use error::{EvalViewError, Result};
pub use histogram::{grouped_histograms, histogram, BinLabel, GroupHistogram, HistogramBin};
pub use model::{
    ColumnKind, ExpandedColumn, Feedback, FeedbackColumn, FeedbackField, FeedbackGrouping,
    FeedbackTemplate, FieldKind, NumericRange, RegularColumn, RubricItem, Row, Span, UNKNOWN,
};
pub use path::{resolve, resolve_display};
pub use projection::{
    column_for, group_rows, project, project_row, project_rows, xy_series, Cell, Projection,
    RowGroup, RowView, XyPoint, XySeries, NO_GROUP,
};
pub use schema::{reconcile, schema_paths, toggle_column, ColumnSchema, SchemaStore};
pub use summary::{compare_experiments, numeric_feedback_fields, SummaryGroup};
pub use table::{
    filter_rows, infer_data_type, sort_rows, ColumnFilter, DataType, FilterOperator, SortOrder,
};
