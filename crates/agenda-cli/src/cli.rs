use std::path::PathBuf;

use agenda_core::models::{ConflictSource, Resolution};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "agenda")]
#[command(about = "Plan tasks locally and mirror scheduled ones into your calendar")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new item
    #[command(alias = "new")]
    Add {
        /// Item title
        title: Vec<String>,
        /// Start time (RFC 3339); makes the item scheduled
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
        /// Event length in minutes
        #[arg(long, value_name = "MINUTES")]
        duration: Option<u32>,
        /// Longer description sent along with the event
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List recently edited items
    List {
        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync state of one item
    Status {
        /// Item ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one reconciliation pass against the calendar
    Reconcile {
        /// Maximum number of items to look at
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Review and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Feed field values pulled from the remote task list
    Ingest {
        /// Item ID or unique ID prefix
        id: String,
        /// JSON object with any of title, description, scheduled_at, status
        patch: String,
        /// Presentation row the values came from
        #[arg(long, value_name = "REF")]
        row_ref: Option<String>,
    },
    /// Clear the failure history of an item so it is retried
    Reset {
        /// Item ID or unique ID prefix
        id: String,
    },
    /// Summarize sync health
    Digest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicts, open ones by default
    List {
        /// Only conflicts from this source
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Number of conflicts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Close a conflict and apply the chosen side
    Resolve {
        /// Conflict ID or unique ID prefix
        id: String,
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceArg {
    CalendarDrift,
    TasksPull,
}

impl From<SourceArg> for ConflictSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::CalendarDrift => Self::CalendarDrift,
            SourceArg::TasksPull => Self::TasksPull,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    KeepLocal,
    KeepRemote,
    Merged,
}

impl From<ResolutionArg> for Resolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::KeepLocal => Self::KeepLocal,
            ResolutionArg::KeepRemote => Self::KeepRemote,
            ResolutionArg::Merged => Self::Merged,
        }
    }
}
