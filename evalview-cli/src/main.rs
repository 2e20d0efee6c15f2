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

//! Evalview CLI
//!
//! Command-line access to the experiment row engine. Every command prints
//! JSON on stdout; logs go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evalview_core::{EvalViewConfig, FeedbackGrouping};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "evalview")]
#[command(author, version, about = "Evalview - experiment row projection and feedback aggregation", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schema directory (overrides config file)
    #[arg(long, global = true, env = "EVALVIEW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the columns discovered in a rows file
    Columns {
        /// JSON file holding an array of rows
        #[arg(long)]
        rows: PathBuf,

        /// Expansion depth under span input data
        #[arg(long)]
        input_depth: Option<usize>,

        /// Expansion depth under span output data
        #[arg(long)]
        output_depth: Option<usize>,

        /// Expansion depth under span meta info
        #[arg(long)]
        meta_depth: Option<usize>,

        /// Keep only columns whose label or group matches
        #[arg(short, long)]
        search: Option<String>,

        /// Output catalog groups instead of a flat list
        #[arg(long)]
        grouped: bool,
    },

    /// Project rows onto a column selection
    Project {
        #[arg(long)]
        rows: PathBuf,

        /// Column path, repeatable (defaults to every discovered column)
        #[arg(long = "column")]
        columns: Vec<String>,

        /// Rebuild the selection from this experiment's stored schema
        #[arg(long)]
        experiment: Option<String>,

        /// Feedback grouping policy
        #[arg(short, long)]
        grouping: Option<FeedbackGrouping>,

        /// Filter as "PATH OPERATOR VALUE", repeatable
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Sort by this column path
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Histogram of one column, optionally per group
    Histogram {
        #[arg(long)]
        rows: PathBuf,

        #[arg(long)]
        column: String,

        /// Number of bins (overrides config file)
        #[arg(short, long)]
        bins: Option<usize>,

        #[arg(short, long)]
        grouping: Option<FeedbackGrouping>,

        /// Group selector, up to two
        #[arg(long = "group-by")]
        group_by: Vec<String>,
    },

    /// Partition rows by one or two columns
    Groups {
        #[arg(long)]
        rows: PathBuf,

        #[arg(long = "group-by", required = true)]
        group_by: Vec<String>,

        #[arg(short, long)]
        grouping: Option<FeedbackGrouping>,
    },

    /// Average numeric feedback per group across two experiments
    Summary {
        #[arg(long)]
        rows_x: PathBuf,

        #[arg(long)]
        rows_y: Option<PathBuf>,

        /// Row path to group by
        #[arg(long)]
        group: String,
    },

    /// Stored column schemas
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Submit feedback through the sequential submission queue
    Submit {
        /// JSON array of {"row_id", "payload"} or {"row_id", "inputs"} objects
        #[arg(short, long)]
        file: PathBuf,

        /// Feedback template used to validate "inputs" entries
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Every template field must be answered
        #[arg(long)]
        require_all: bool,

        /// Experiment API base URL (overrides config file)
        #[arg(long, env = "EVALVIEW_API_URL")]
        api_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Show the schema for an experiment
    Get {
        #[arg(long)]
        experiment: String,
    },

    /// Replace the schema for an experiment
    Set {
        #[arg(long)]
        experiment: String,

        #[arg(long = "column", required = true)]
        columns: Vec<String>,
    },

    /// Reset an experiment to the persistent columns
    Reset {
        #[arg(long)]
        experiment: String,
    },

    /// List every stored schema
    List,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "evalview=info,evalview_core=info,evalview_feedback=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Load configuration
    let mut config = EvalViewConfig::load(cli.config).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let output = match cli.command {
        Commands::Columns {
            rows,
            input_depth,
            output_depth,
            meta_depth,
            search,
            grouped,
        } => {
            if let Some(depth) = input_depth {
                config.discovery.input_depth = depth;
            }
            if let Some(depth) = output_depth {
                config.discovery.output_depth = depth;
            }
            if let Some(depth) = meta_depth {
                config.discovery.meta_depth = depth;
            }
            let rows = commands::load_rows(&rows)?;
            commands::columns(&rows, &config, search.as_deref(), grouped)?
        }

        Commands::Project {
            rows,
            columns,
            experiment,
            grouping,
            filters,
            sort,
            desc,
        } => {
            let rows = commands::load_rows(&rows)?;
            let request = commands::ProjectRequest {
                columns,
                experiment,
                grouping: grouping.unwrap_or(config.display.grouping),
                filters,
                sort,
                descending: desc,
            };
            commands::project(&rows, &config, &request)?
        }

        Commands::Histogram {
            rows,
            column,
            bins,
            grouping,
            group_by,
        } => {
            let rows = commands::load_rows(&rows)?;
            commands::histogram(
                &rows,
                &config,
                &column,
                bins.unwrap_or(config.display.bins),
                grouping.unwrap_or(config.display.grouping),
                &group_by,
            )?
        }

        Commands::Groups {
            rows,
            group_by,
            grouping,
        } => {
            let rows = commands::load_rows(&rows)?;
            commands::groups(
                &rows,
                &config,
                &group_by,
                grouping.unwrap_or(config.display.grouping),
            )?
        }

        Commands::Summary {
            rows_x,
            rows_y,
            group,
        } => {
            let rows_x = commands::load_rows(&rows_x)?;
            let rows_y = match rows_y {
                Some(path) => commands::load_rows(&path)?,
                None => Vec::new(),
            };
            commands::summary(&rows_x, &rows_y, &group)?
        }

        Commands::Schema { command } => {
            let mut store = evalview_core::SchemaStore::new(&config.storage.data_dir);
            match command {
                SchemaCommands::Get { experiment } => commands::schema_get(&store, &experiment)?,
                SchemaCommands::Set {
                    experiment,
                    columns,
                } => commands::schema_set(&mut store, &experiment, columns)?,
                SchemaCommands::Reset { experiment } => {
                    commands::schema_reset(&mut store, &experiment)?
                }
                SchemaCommands::List => commands::schema_list(&store)?,
            }
        }

        Commands::Submit {
            file,
            template,
            require_all,
            api_url,
        } => {
            if let Some(url) = api_url {
                config.feedback.api_base_url = url;
            }
            let template = template
                .as_deref()
                .map(commands::load_template)
                .transpose()?;
            let records = commands::load_submissions(&file)?;
            let submissions =
                commands::prepare_submissions(records, template.as_ref(), require_all)?;
            commands::submit(submissions, &config).await?
        }
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
