use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "importer")]
#[command(about = "Bulk-create tickets from a spreadsheet")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ./importer.ron)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Importer server base URL, overriding the config file
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Status poll period in milliseconds, overriding the config file
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Where log output goes
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::File)]
    pub log: LogTarget,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a spreadsheet, preview it and create one ticket per row
    Upload {
        /// .xlsx or .xls file
        file: PathBuf,

        /// Create tickets without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show one ticket
    Lookup {
        /// Ticket key, e.g. PROJ-123 (case-insensitive)
        key: String,
    },

    /// Check the importer server and its ticketing connection
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}
